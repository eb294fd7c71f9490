//! MLB Stats API adapter: the official schedule/results feed. Unlike the
//! other five providers this one carries no money/bet splits, so it never
//! contributes betting-percentage Observations — it implements
//! [`SourceAdapter`] for identity/health uniformity (§4.1: "adding one must
//! require no change to other components") but its useful surface is
//! [`MlbStatsAdapter::fetch_completed_games`], consumed directly by the Game
//! Outcome Resolver (C7, §4.6).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::{AdapterHealth, AdapterIdentity, AdapterState, FetchWindow, SourceAdapter, SourceId};
use crate::domain::{Market, Observation};
use crate::error::{CoreError, Result};

const SCHEDULE_ENDPOINT: &str = "https://statsapi.mlb.com/api/v1/schedule";

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    dates: Vec<ScheduleDate>,
}

#[derive(Debug, Deserialize)]
struct ScheduleDate {
    games: Vec<GameEntry>,
}

#[derive(Debug, Deserialize)]
struct GameEntry {
    #[serde(rename = "gamePk")]
    game_pk: i64,
    status: GameStatus,
    teams: TeamsEntry,
}

#[derive(Debug, Deserialize)]
struct GameStatus {
    #[serde(rename = "abstractGameState")]
    abstract_game_state: String,
}

#[derive(Debug, Deserialize)]
struct TeamsEntry {
    home: SideEntry,
    away: SideEntry,
}

#[derive(Debug, Deserialize)]
struct SideEntry {
    score: Option<i32>,
    team: TeamName,
}

#[derive(Debug, Deserialize)]
struct TeamName {
    name: String,
}

/// A completed-game result as reported by MLB Stats, prior to the §4.6
/// lookahead check and §4.4 team canonicalization.
#[derive(Debug, Clone)]
pub struct CompletedGame {
    pub game_pk: i64,
    pub home_team_raw: String,
    pub away_team_raw: String,
    pub home_score: i32,
    pub away_score: i32,
    pub resolution_timestamp: DateTime<Utc>,
}

pub struct MlbStatsAdapter {
    client: reqwest::Client,
    state: AdapterState,
}

impl MlbStatsAdapter {
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

    /// Poll completed games for one Eastern calendar date (§4.6: "Polls
    /// results from a designated source post-game").
    pub async fn fetch_completed_games(&self, date: NaiveDate) -> Result<Vec<CompletedGame>> {
        let response = self
            .client
            .get(SCHEDULE_ENDPOINT)
            .query(&[
                ("sportId", "1".to_string()),
                ("date", date.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await
            .map_err(|e| CoreError::SourceUnavailable(format!("mlb_stats: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::SourceRateLimited("mlb_stats".to_string()));
        }
        if !response.status().is_success() {
            return Err(CoreError::SourceUnavailable(format!(
                "mlb_stats: http {}",
                response.status()
            )));
        }

        let body: ScheduleResponse = response
            .json()
            .await
            .map_err(|e| CoreError::SourceParseError(format!("mlb_stats: {e}")))?;

        let resolved_at = Utc::now();
        let mut games = Vec::new();
        for date in &body.dates {
            for game in &date.games {
                if game.status.abstract_game_state != "Final" {
                    continue;
                }
                let (Some(home_score), Some(away_score)) =
                    (game.teams.home.score, game.teams.away.score)
                else {
                    continue;
                };
                games.push(CompletedGame {
                    game_pk: game.game_pk,
                    home_team_raw: game.teams.home.team.name.clone(),
                    away_team_raw: game.teams.away.team.name.clone(),
                    home_score,
                    away_score,
                    resolution_timestamp: resolved_at,
                });
            }
        }

        if games.is_empty() {
            self.state.record_failure();
            return Err(CoreError::SourceEmpty);
        }
        self.state.record_success(resolved_at);
        Ok(games)
    }
}

#[async_trait]
impl SourceAdapter for MlbStatsAdapter {
    async fn fetch(&self, _window: FetchWindow) -> Result<Vec<Observation>> {
        Err(CoreError::SourceEmpty)
    }

    fn health(&self) -> AdapterHealth {
        self.state.health()
    }

    fn identity(&self) -> AdapterIdentity {
        AdapterIdentity {
            source: SourceId::MlbStats,
            books_supported: Vec::new(),
            markets_supported: vec![Market::Moneyline],
            cadence_seconds: 900,
        }
    }
}
