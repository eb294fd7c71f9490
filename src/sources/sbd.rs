//! Sports Betting Dime (SBD) adapter: embedded HTML consensus table, no
//! authentication, multi-book per row.
//!
//! Documented column layout: `[0] game_id, [1] book, [2] market, [3]
//! money_pct, [4] bet_pct, [5] line`.

use async_trait::async_trait;
use chrono::Utc;

use super::{
    parse_html_rows, parse_pct_cell, AdapterHealth, AdapterIdentity, AdapterState, FetchWindow,
    SourceAdapter, SourceId,
};
use crate::domain::{Market, Observation};
use crate::error::{CoreError, Result};

const ENDPOINT: &str = "https://www.sportsbettingdime.com/mlb/public-betting-trends/";

pub struct SbdAdapter {
    client: reqwest::Client,
    state: AdapterState,
}

impl SbdAdapter {
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
            "ml" | "moneyline" => Some(Market::Moneyline),
            "spread" | "ats" => Some(Market::Spread),
            "total" | "ou" => Some(Market::Total),
            _ => None,
        }
    }
}

#[async_trait]
impl SourceAdapter for SbdAdapter {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Observation>> {
        let response = self
            .client
            .get(ENDPOINT)
            .send()
            .await
            .map_err(|e| CoreError::SourceUnavailable(format!("sbd: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::SourceRateLimited("sbd".to_string()));
        }
        if !response.status().is_success() {
            return Err(CoreError::SourceUnavailable(format!(
                "sbd: http {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| CoreError::SourceParseError(format!("sbd: {e}")))?;

        let rows = parse_html_rows(&html);
        let collected_at = Utc::now();
        let mut observations = Vec::new();

        for row in &rows {
            if row.len() < 5 {
                continue;
            }
            let Some(market) = Self::parse_market(&row[2]) else {
                continue;
            };
            observations.push(Observation {
                ingestion_id: None,
                source: SourceId::Sbd.as_str().to_string(),
                book: if row[1].is_empty() {
                    "UNKNOWN".to_string()
                } else {
                    row[1].clone()
                },
                game_external_id: row[0].clone(),
                market,
                collected_at,
                ingestion_sequence: self.state.next_sequence(),
                endpoint: ENDPOINT.to_string(),
                money_pct: parse_pct_cell(&row[3]),
                bet_pct: parse_pct_cell(&row[4]),
                split_value: row.get(5).cloned(),
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
            source: SourceId::Sbd,
            books_supported: vec!["DraftKings".into(), "FanDuel".into(), "BetRivers".into()],
            markets_supported: vec![Market::Moneyline, Market::Spread, Market::Total],
            cadence_seconds: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_market_abbreviations() {
        assert_eq!(SbdAdapter::parse_market("ML"), Some(Market::Moneyline));
        assert_eq!(SbdAdapter::parse_market("OU"), Some(Market::Total));
        assert_eq!(SbdAdapter::parse_market("prop"), None);
    }
}
