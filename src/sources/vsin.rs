//! VSIN adapter: embedded HTML "Sharp Report" table, no authentication.
//!
//! Documented column layout for the betting-splits table VSIN publishes per
//! sport (index is 0-based, matching `parse_html_rows`' cell order):
//! `[0] matchup, [1] book, [2] money_pct, [3] bet_pct, [4] home_bet_count,
//! [5] away_bet_count, [6] line`.

use async_trait::async_trait;
use chrono::Utc;

use super::{
    parse_html_rows, parse_pct_cell, AdapterHealth, AdapterIdentity, AdapterState, FetchWindow,
    SourceAdapter, SourceId,
};
use crate::domain::{Market, Observation};
use crate::error::{CoreError, Result};

const ENDPOINT: &str = "https://www.vsin.com/betting-splits/mlb/";

pub struct VsinAdapter {
    client: reqwest::Client,
    state: AdapterState,
    /// VSIN only ever exposes one market per scrape cycle (selected via query
    /// string on the real site); the caller configures which.
    market: Market,
}

impl VsinAdapter {
    pub fn new(market: Market, daily_quota: u32, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            client,
            state: AdapterState::new(daily_quota),
            market,
        }
    }

    fn game_external_id(matchup: &str) -> String {
        matchup
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .to_lowercase()
    }
}

#[async_trait]
impl SourceAdapter for VsinAdapter {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Observation>> {
        let response = self
            .client
            .get(ENDPOINT)
            .send()
            .await
            .map_err(|e| CoreError::SourceUnavailable(format!("vsin: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::SourceRateLimited("vsin".to_string()));
        }
        if !response.status().is_success() {
            return Err(CoreError::SourceUnavailable(format!(
                "vsin: http {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| CoreError::SourceParseError(format!("vsin: {e}")))?;

        let rows = parse_html_rows(&html);
        if rows.is_empty() {
            return Err(CoreError::SourceParseError(
                "vsin: no table rows found".to_string(),
            ));
        }

        let collected_at = Utc::now();
        let mut observations = Vec::new();

        for row in &rows {
            if row.len() < 6 {
                continue;
            }
            let matchup = &row[0];
            let book = if row[1].is_empty() {
                "UNKNOWN".to_string()
            } else {
                row[1].clone()
            };
            let money_pct = parse_pct_cell(&row[2]);
            let bet_pct = parse_pct_cell(&row[3]);
            let home_bet_count = row[4].parse::<i64>().ok();
            let away_bet_count = row[5].parse::<i64>().ok();
            let split_value = row.get(6).cloned();

            observations.push(Observation {
                ingestion_id: None,
                source: SourceId::Vsin.as_str().to_string(),
                book,
                game_external_id: Self::game_external_id(matchup),
                market: self.market,
                collected_at,
                ingestion_sequence: self.state.next_sequence(),
                endpoint: ENDPOINT.to_string(),
                money_pct,
                bet_pct,
                split_value,
                home_bet_count,
                away_bet_count,
                raw_payload: row.join("|").into_bytes(),
            });
        }

        if observations.is_empty() {
            self.state.record_failure();
            return Err(CoreError::SourceEmpty);
        }

        self.state.record_success(collected_at);
        Ok(super::drop_postgame(observations, window.end))
    }

    fn health(&self) -> AdapterHealth {
        self.state.health()
    }

    fn identity(&self) -> AdapterIdentity {
        AdapterIdentity {
            source: SourceId::Vsin,
            books_supported: vec!["Circa".into(), "DraftKings".into(), "FanDuel".into()],
            markets_supported: vec![Market::Moneyline, Market::Spread, Market::Total],
            cadence_seconds: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::parse_html_rows;

    #[test]
    fn extracts_rows_from_table_markup() {
        let html = r#"
        <table>
        <tr><td>NYY @ BOS</td><td>Circa</td><td>72%</td><td>55%</td><td>1200</td><td>900</td><td>-145</td></tr>
        </table>
        "#;
        let rows = parse_html_rows(html);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "NYY @ BOS");
        assert_eq!(rows[0][2], "72%");
    }
}
