//! Shared entity types for the signal-detection core: `Observation` (RAW),
//! `CuratedPoint` (CURATED), `StrategyVariant` / `CandidateSignal` /
//! `Recommendation` (strategy + arbitration), `OutcomeRecord` and
//! `BacktestResult`. Persistence format is JSON-in-sqlite; these structs are
//! the wire/storage representation used across every zone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One of the three betting markets this core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Moneyline,
    Spread,
    Total,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Moneyline => "moneyline",
            Market::Spread => "spread",
            Market::Total => "total",
        }
    }

    /// Resolve a differential sign into this market's concrete side:
    /// HOME/AWAY for moneyline and spread, OVER/UNDER for total (GLOSSARY:
    /// "positive means sharper money on the home/over side").
    pub fn side_for_sign(&self, positive: bool) -> Side {
        match (self, positive) {
            (Market::Total, true) => Side::Over,
            (Market::Total, false) => Side::Under,
            (_, true) => Side::Home,
            (_, false) => Side::Away,
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Market {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moneyline" => Ok(Market::Moneyline),
            "spread" => Ok(Market::Spread),
            "total" => Ok(Market::Total),
            other => Err(crate::error::CoreError::SourceParseError(format!(
                "unknown market: {other}"
            ))),
        }
    }
}

/// Which side of a market a signal/recommendation favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Home,
    Away,
    Over,
    Under,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
            Side::Over => Side::Under,
            Side::Under => Side::Over,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "HOME",
            Side::Away => "AWAY",
            Side::Over => "OVER",
            Side::Under => "UNDER",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse sharp-signal tag derived from `money_minus_bet` (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharpTag {
    StrongHome,
    ModerateHome,
    WeakHome,
    None,
    WeakAway,
    ModerateAway,
    StrongAway,
}

impl SharpTag {
    /// Classify a `money_minus_bet` differential into a tag, per §4.5.
    pub fn from_differential(diff: f64) -> Self {
        let mag = diff.abs();
        if mag >= 15.0 {
            if diff > 0.0 {
                SharpTag::StrongHome
            } else {
                SharpTag::StrongAway
            }
        } else if mag >= 10.0 {
            if diff > 0.0 {
                SharpTag::ModerateHome
            } else {
                SharpTag::ModerateAway
            }
        } else if mag >= 5.0 {
            if diff > 0.0 {
                SharpTag::WeakHome
            } else {
                SharpTag::WeakAway
            }
        } else {
            SharpTag::None
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, SharpTag::StrongHome | SharpTag::StrongAway)
    }

    /// Side implied by the tag, if any (for HOME/OVER vs AWAY/UNDER framing
    /// the caller resolves against the concrete market).
    pub fn side(&self) -> Option<Side> {
        match self {
            SharpTag::StrongHome | SharpTag::ModerateHome | SharpTag::WeakHome => {
                Some(Side::Home)
            }
            SharpTag::StrongAway | SharpTag::ModerateAway | SharpTag::WeakAway => {
                Some(Side::Away)
            }
            SharpTag::None => None,
        }
    }
}

/// How close to game start a point was collected (§4.5, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimingBucket {
    Opening,
    Early,
    SameDay,
    Late,
    Closing2h,
    ClosingHour,
    UltraLate,
}

impl TimingBucket {
    /// Bucket from hours-before-game-start.
    pub fn from_hours_before(hours: f64) -> Self {
        if hours >= 120.0 {
            TimingBucket::Opening
        } else if hours >= 24.0 {
            TimingBucket::Early
        } else if hours >= 6.0 {
            TimingBucket::SameDay
        } else if hours >= 2.0 {
            TimingBucket::Late
        } else if hours >= 1.0 {
            TimingBucket::Closing2h
        } else if hours >= 1.0 / 60.0 {
            TimingBucket::ClosingHour
        } else {
            TimingBucket::UltraLate
        }
    }

    /// Confidence multiplier applied by the Detector Engine (§4.8).
    pub fn confidence_boost(&self) -> f64 {
        match self {
            TimingBucket::Closing2h => 1.2,
            TimingBucket::ClosingHour => 1.3,
            TimingBucket::UltraLate => 1.5,
            _ => 1.0,
        }
    }

    pub fn is_late_window(&self) -> bool {
        matches!(
            self,
            TimingBucket::Closing2h | TimingBucket::ClosingHour | TimingBucket::UltraLate
        )
    }
}

/// Market-size tag for a team, used by a handful of detectors (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketSizeTag {
    Large,
    Medium,
    Small,
}

/// Coarse time-of-day a game was played, used by ballpark-sensitive detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Daypart {
    Day,
    Twilight,
    Night,
    Primetime,
}

/// One raw measurement from one source, for one market of one game, at one
/// moment (§3 Observation). Identity is `(source, book, game_external_id,
/// market, collected_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub ingestion_id: Option<i64>,
    pub source: String,
    pub book: String,
    pub game_external_id: String,
    pub market: Market,
    pub collected_at: DateTime<Utc>,
    /// Monotonically increasing per-source sequence, for tie-breaking.
    pub ingestion_sequence: i64,
    pub endpoint: String,
    pub money_pct: Option<f64>,
    pub bet_pct: Option<f64>,
    /// JSON for moneyline `{home,away}`, decimal string for spread/total.
    pub split_value: Option<String>,
    pub home_bet_count: Option<i64>,
    pub away_bet_count: Option<i64>,
    /// Byte-for-byte copy of the provider payload fragment this row came from.
    pub raw_payload: Vec<u8>,
}

impl Observation {
    /// Clamp a parsed percentage to the NULL-on-out-of-range rule
    /// (§4.1: "values outside [0,100] -> NULL, not zero").
    pub fn sanitize_pct(value: Option<f64>) -> Option<f64> {
        value.filter(|v| (0.0..=100.0).contains(v))
    }
}

/// One scheduled contest (§3 Game).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub game_id: i64,
    pub home_team_canonical: String,
    pub away_team_canonical: String,
    pub game_date_eastern: chrono::NaiveDate,
    pub game_start_utc: DateTime<Utc>,
    pub park: String,
    pub market_size_tag: MarketSizeTag,
    pub daypart: Daypart,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub home_win: Option<bool>,
    pub home_cover_spread: Option<bool>,
    pub over: Option<bool>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Game {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// §4.6 invariant: a query at time T may not observe resolutions with
    /// `resolution_timestamp <= T`.
    pub fn resolved_before(&self, t: DateTime<Utc>) -> bool {
        matches!(self.resolved_at, Some(r) if r < t)
    }
}

/// The deduplicated, normalized time point for one (game, source, book,
/// market) (§3 CuratedPoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedPoint {
    pub id: Option<i64>,
    pub game_id: i64,
    pub source: String,
    pub book: String,
    pub market: Market,
    pub collected_at: DateTime<Utc>,
    pub money_pct: Option<f64>,
    pub bet_pct: Option<f64>,
    pub money_minus_bet: Option<f64>,
    pub sharp_tag: SharpTag,
    pub timing_bucket: TimingBucket,
    pub quality_score: f64,
    pub split_value: Option<String>,
    pub line_movement_from_prev: Option<f64>,
    pub book_credibility_weight: f64,
}

/// Status of one strategy variant in the catalog (§3 StrategyVariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VariantStatus {
    Active,
    Shadow,
    Disabled,
}

/// One rule configuration in the strategy catalog (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyVariant {
    pub strategy_name: String,
    pub variant_name: String,
    pub description: String,
    pub markets: Vec<Market>,
    pub thresholds: BTreeMap<String, f64>,
    pub min_sample_size: u32,
    pub status: VariantStatus,
    pub last_tuned_at: Option<DateTime<Utc>>,
    /// Historical edge weight used by the Arbiter's weighted merge (§4.12).
    pub edge_weight: f64,
}

impl StrategyVariant {
    pub fn threshold(&self, name: &str, default: f64) -> f64 {
        self.thresholds.get(name).copied().unwrap_or(default)
    }

    pub fn applies_to(&self, market: Market) -> bool {
        self.markets.contains(&market)
    }

    pub fn key(&self) -> (String, String) {
        (self.strategy_name.clone(), self.variant_name.clone())
    }
}

/// One fired detector output (§3 CandidateSignal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub game_id: i64,
    pub market: Market,
    pub book: String,
    pub source: String,
    pub strategy_name: String,
    pub variant_name: String,
    pub fired_at: DateTime<Utc>,
    pub side: Side,
    pub raw_confidence: f64,
    pub features: BTreeMap<String, f64>,
    /// Ids of the CuratedPoints that triggered this signal, for audit.
    pub triggering_point_ids: Vec<i64>,
}

impl CandidateSignal {
    pub fn sort_key(&self) -> (i64, &'static str, String, String, String) {
        (
            self.game_id,
            self.market.as_str(),
            self.book.clone(),
            self.strategy_name.clone(),
            self.variant_name.clone(),
        )
    }
}

/// Result of the juice filter for one recommendation (§4.9 last bullet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JuiceCheck {
    Passed,
    NotApplicable,
    Rejected,
}

/// One contributing variant to an arbitrated recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributingVariant {
    pub strategy_name: String,
    pub variant_name: String,
    pub weight: f64,
    pub raw_confidence: f64,
}

/// Arbitrated output (§3 Recommendation). At most one per `(game_id, market,
/// book)` per Arbiter run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub run_id: i64,
    pub game_id: i64,
    pub market: Market,
    pub book: String,
    pub side: Side,
    pub final_confidence: f64,
    pub contributing_variants: Vec<ContributingVariant>,
    pub juice_check: JuiceCheck,
    pub expected_roi_estimate: Option<f64>,
    pub rank: u32,
}

/// Completed-game result (§3 OutcomeRecord).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub game_id: i64,
    pub home_score: i32,
    pub away_score: i32,
    pub home_win: bool,
    pub home_cover_spread: Option<bool>,
    pub over: Option<bool>,
    pub resolution_timestamp: DateTime<Utc>,
}

/// Confidence tier assigned to a backtest result by sample size (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceTier {
    pub fn from_sample_size(n: u32) -> Self {
        if n >= 50 {
            ConfidenceTier::High
        } else if n >= 20 {
            ConfidenceTier::Medium
        } else if n >= 10 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::VeryLow
        }
    }

    pub fn at_least_medium(&self) -> bool {
        matches!(self, ConfidenceTier::High | ConfidenceTier::Medium)
    }
}

/// Aggregated performance per variant over a window (§3 BacktestResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub variant_name: String,
    pub market: Market,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub bets_count: u32,
    pub wins: u32,
    pub win_rate: f64,
    pub roi_at_minus_110: f64,
    pub roi_using_actual_odds: Option<f64>,
    pub drawdown: f64,
    pub confidence_tier: ConfidenceTier,
    pub sample_sufficient: bool,
}

impl BacktestResult {
    /// ROI policy (§9 Open Questions): moneyline uses actual odds when
    /// present, else -110; spread/total are fixed -110.
    pub fn authoritative_roi(&self) -> f64 {
        match self.market {
            Market::Moneyline => self.roi_using_actual_odds.unwrap_or(self.roi_at_minus_110),
            Market::Spread | Market::Total => self.roi_at_minus_110,
        }
    }
}
