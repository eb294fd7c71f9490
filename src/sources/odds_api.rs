//! The Odds API adapter: JSON REST API, API-key authenticated. This provider
//! publishes consensus lines but no bet/money percentages, so every
//! Observation it emits has `money_pct`/`bet_pct` left NULL — it exists in
//! the book-set to give the Staging Transformer a credible-book cross-check
//! for `line_movement_from_prev`, not for sharp differential detection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{AdapterHealth, AdapterIdentity, AdapterState, FetchWindow, SourceAdapter, SourceId};
use crate::domain::{Market, Observation};
use crate::error::{CoreError, Result};

const ENDPOINT: &str = "https://api.the-odds-api.com/v4/sports/baseball_mlb/odds";

#[derive(Debug, Deserialize)]
struct OddsEvent {
    id: String,
    commence_time: DateTime<Utc>,
    bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
struct Bookmaker {
    key: String,
    markets: Vec<OddsMarket>,
}

#[derive(Debug, Deserialize)]
struct OddsMarket {
    key: String,
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    price: f64,
    point: Option<f64>,
}

pub struct OddsApiAdapter {
    client: reqwest::Client,
    api_key: String,
    state: AdapterState,
}

impl OddsApiAdapter {
    pub fn new(api_key: String, daily_quota: u32, timeout_secs: u64) -> Self {
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

    fn market_of(key: &str) -> Option<Market> {
        match key {
            "h2h" => Some(Market::Moneyline),
            "spreads" => Some(Market::Spread),
            "totals" => Some(Market::Total),
            _ => None,
        }
    }

    fn split_value_of(market: &OddsMarket) -> Option<String> {
        match market.outcomes.as_slice() {
            [home, away] => match Self::market_of(&market.key)? {
                Market::Moneyline => {
                    serde_json::json!({"home": home.price, "away": away.price})
                        .to_string()
                        .into()
                }
                Market::Spread | Market::Total => home.point.map(|p| p.to_string()),
            },
            _ => None,
        }
    }
}

#[async_trait]
impl SourceAdapter for OddsApiAdapter {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Observation>> {
        let response = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", "us"),
                ("markets", "h2h,spreads,totals"),
            ])
            .send()
            .await
            .map_err(|e| CoreError::SourceUnavailable(format!("odds_api: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::SourceRateLimited("odds_api".to_string()));
        }
        if !response.status().is_success() {
            return Err(CoreError::SourceUnavailable(format!(
                "odds_api: http {}",
                response.status()
            )));
        }

        let events: Vec<OddsEvent> = response
            .json()
            .await
            .map_err(|e| CoreError::SourceParseError(format!("odds_api: {e}")))?;

        let collected_at = Utc::now();
        let mut observations = Vec::new();

        for event in &events {
            if collected_at >= event.commence_time {
                continue;
            }
            for bookmaker in &event.bookmakers {
                for market in &bookmaker.markets {
                    let Some(market_type) = Self::market_of(&market.key) else {
                        continue;
                    };
                    observations.push(Observation {
                        ingestion_id: None,
                        source: SourceId::OddsApi.as_str().to_string(),
                        book: bookmaker.key.clone(),
                        game_external_id: event.id.clone(),
                        market: market_type,
                        collected_at,
                        ingestion_sequence: self.state.next_sequence(),
                        endpoint: ENDPOINT.to_string(),
                        money_pct: None,
                        bet_pct: None,
                        split_value: Self::split_value_of(market),
                        home_bet_count: None,
                        away_bet_count: None,
                        raw_payload: serde_json::to_vec(&market.outcomes).unwrap_or_default(),
                    });
                }
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
            source: SourceId::OddsApi,
            books_supported: vec!["DraftKings".into(), "FanDuel".into(), "BetMGM".into()],
            markets_supported: vec![Market::Moneyline, Market::Spread, Market::Total],
            cadence_seconds: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_market_keys() {
        assert_eq!(OddsApiAdapter::market_of("h2h"), Some(Market::Moneyline));
        assert_eq!(OddsApiAdapter::market_of("totals"), Some(Market::Total));
        assert_eq!(OddsApiAdapter::market_of("player_props"), None);
    }
}
