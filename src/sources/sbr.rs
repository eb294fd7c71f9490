//! SportsBookReview (SBR) adapter: embedded HTML consensus table, no
//! authentication. Note the `sbr` alias is resolved to this adapter only at
//! the [`super::SourceId`] registry boundary (§9 REDESIGN FLAGS) — nothing
//! downstream ever matches on the string "sbr" again.
//!
//! Documented column layout: `[0] away_team, [1] home_team, [2] book, [3]
//! market, [4] money_pct_home, [5] bet_pct_home, [6] line`.

use async_trait::async_trait;
use chrono::Utc;

use super::{
    parse_html_rows, parse_pct_cell, AdapterHealth, AdapterIdentity, AdapterState, FetchWindow,
    SourceAdapter, SourceId,
};
use crate::domain::{Market, Observation};
use crate::error::{CoreError, Result};

const ENDPOINT: &str = "https://www.sportsbookreview.com/betting-odds/mlb-baseball/money-line/";

pub struct SbrAdapter {
    client: reqwest::Client,
    state: AdapterState,
}

impl SbrAdapter {
    pub fn new(daily_quota: u32, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            client,
            state: AdapterState::new(daily_quota),
        }
    }

    fn parse_market(raw: &str) -> Option<Market> {
        match raw.to_ascii_lowercase().as_str() {
            "money-line" | "moneyline" => Some(Market::Moneyline),
            "pointspread" | "spread" => Some(Market::Spread),
            "totals" | "total" => Some(Market::Total),
            _ => None,
        }
    }
}

#[async_trait]
impl SourceAdapter for SbrAdapter {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Observation>> {
        let response = self
            .client
            .get(ENDPOINT)
            .send()
            .await
            .map_err(|e| CoreError::SourceUnavailable(format!("sbr: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::SourceRateLimited("sbr".to_string()));
        }
        if !response.status().is_success() {
            return Err(CoreError::SourceUnavailable(format!(
                "sbr: http {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| CoreError::SourceParseError(format!("sbr: {e}")))?;

        let rows = parse_html_rows(&html);
        let collected_at = Utc::now();
        let mut observations = Vec::new();

        for row in &rows {
            if row.len() < 6 {
                continue;
            }
            let Some(market) = Self::parse_market(&row[3]) else {
                continue;
            };
            let game_external_id = format!("{}_{}", row[0], row[1]).to_lowercase().replace(' ', "_");
            observations.push(Observation {
                ingestion_id: None,
                source: SourceId::Sbr.as_str().to_string(),
                book: if row[2].is_empty() {
                    "UNKNOWN".to_string()
                } else {
                    row[2].clone()
                },
                game_external_id,
                market,
                collected_at,
                ingestion_sequence: self.state.next_sequence(),
                endpoint: ENDPOINT.to_string(),
                money_pct: parse_pct_cell(&row[4]),
                bet_pct: parse_pct_cell(&row[5]),
                split_value: row.get(6).cloned(),
                home_bet_count: None,
                away_bet_count: None,
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
            source: SourceId::Sbr,
            books_supported: vec!["Pinnacle".into(), "BookMaker".into(), "Caesars".into()],
            markets_supported: vec![Market::Moneyline, Market::Spread, Market::Total],
            cadence_seconds: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_alias_at_registry_boundary() {
        assert_eq!(SourceId::from_alias("SBR"), Some(SourceId::Sbr));
        assert_eq!(
            SourceId::from_alias("sportsbookreview"),
            Some(SourceId::Sbr)
        );
    }
}
