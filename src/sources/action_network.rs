//! Action Network adapter: JSON REST API, API-key authenticated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AdapterHealth, AdapterIdentity, AdapterState, FetchWindow, SourceAdapter, SourceId};
use crate::domain::{Market, Observation};
use crate::error::{CoreError, Result};

const ENDPOINT: &str = "https://api.actionnetwork.com/web/v1/scoreboard/mlb";

#[derive(Debug, Deserialize)]
struct ScoreboardResponse {
    games: Vec<GamePayload>,
}

#[derive(Debug, Deserialize)]
struct GamePayload {
    id: String,
    start_time: DateTime<Utc>,
    markets: Vec<MarketPayload>,
}

#[derive(Debug, Deserialize, Serialize)]
struct MarketPayload {
    book: Option<String>,
    #[serde(rename = "type")]
    market_type: String,
    money_home_pct: Option<f64>,
    bet_home_pct: Option<f64>,
    home_bet_count: Option<i64>,
    away_bet_count: Option<i64>,
    line: Option<serde_json::Value>,
}

pub struct ActionNetworkAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    state: AdapterState,
}

impl ActionNetworkAdapter {
    pub fn new(api_key: Option<String>, daily_quota: u32, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            client,
            api_key,
            state: AdapterState::new(daily_quota),
        }
    }

    fn parse_market_type(raw: &str) -> Option<Market> {
        match raw {
            "moneyline" | "ml" => Some(Market::Moneyline),
            "spread" | "ats" => Some(Market::Spread),
            "total" | "ou" => Some(Market::Total),
            _ => None,
        }
    }
}

#[async_trait]
impl SourceAdapter for ActionNetworkAdapter {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Observation>> {
        let mut request = self.client.get(ENDPOINT);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::SourceUnavailable(format!("action_network: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::SourceRateLimited("action_network".to_string()));
        }
        if !response.status().is_success() {
            return Err(CoreError::SourceUnavailable(format!(
                "action_network: http {}",
                response.status()
            )));
        }

        let body: ScoreboardResponse = response
            .json()
            .await
            .map_err(|e| CoreError::SourceParseError(format!("action_network: {e}")))?;

        let collected_at = Utc::now();
        if collected_at < window.start || collected_at >= window.end {
            return Err(CoreError::SourceEmpty);
        }

        let mut observations = Vec::new();
        for game in &body.games {
            if collected_at >= game.start_time {
                continue;
            }
            for market in &game.markets {
                let Some(market_type) = Self::parse_market_type(&market.market_type) else {
                    continue;
                };
                let split_value = market.line.as_ref().map(|v| v.to_string());
                observations.push(Observation {
                    ingestion_id: None,
                    source: SourceId::ActionNetwork.as_str().to_string(),
                    book: market.book.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
                    game_external_id: game.id.clone(),
                    market: market_type,
                    collected_at,
                    ingestion_sequence: self.state.next_sequence(),
                    endpoint: ENDPOINT.to_string(),
                    money_pct: Observation::sanitize_pct(market.money_home_pct),
                    bet_pct: Observation::sanitize_pct(market.bet_home_pct),
                    split_value,
                    home_bet_count: market.home_bet_count,
                    away_bet_count: market.away_bet_count,
                    raw_payload: serde_json::to_vec(market).unwrap_or_default(),
                });
            }
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
            source: SourceId::ActionNetwork,
            books_supported: vec![
                "Circa".into(),
                "DraftKings".into(),
                "FanDuel".into(),
                "BetMGM".into(),
            ],
            markets_supported: vec![Market::Moneyline, Market::Spread, Market::Total],
            cadence_seconds: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_market_types() {
        assert_eq!(
            ActionNetworkAdapter::parse_market_type("moneyline"),
            Some(Market::Moneyline)
        );
        assert_eq!(
            ActionNetworkAdapter::parse_market_type("ats"),
            Some(Market::Spread)
        );
        assert_eq!(ActionNetworkAdapter::parse_market_type("bogus"), None);
    }
}
