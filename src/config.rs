//! Configuration: adapter settings, global defaults, and the fixed numeric
//! tables the REDESIGN FLAGS ask us to lift out of embedded SQL/business
//! logic (§9: "SQL-embedded business rules... lift into the Strategy
//! Catalog as data").
//!
//! Loaded from a TOML file with environment-variable overrides layered on
//! top via `dotenv` + `env::var`, into a structured `AppConfig` rather than
//! scattered `env::var` calls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Per-source adapter configuration (§6 Inbound Interface: "Adapter
/// configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub source: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub daily_quota: u32,
    pub enabled_books: Vec<String>,
    pub cadence_seconds: u64,
    pub enabled: bool,
}

/// Global defaults, all overridable, all defaulting to the §4/§5 values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Circuit breaker: consecutive failures before OPEN (§4.2, K).
    pub circuit_breaker_failure_threshold: u32,
    /// Circuit breaker: failure window in seconds (§4.2, W).
    pub circuit_breaker_window_secs: i64,
    /// Circuit breaker: cooldown before HALF_OPEN (§4.2, C).
    pub circuit_breaker_cooldown_secs: i64,
    /// Arbiter confidence floor (§4.12 step 5).
    pub confidence_floor: f64,
    /// Juice filter cutoff, moneyline odds worse than this are rejected
    /// (§4.9 last bullet). Stored as the threshold itself (-160).
    pub juice_cutoff: i32,
    /// Minimum sample size for a variant to activate (§4.7, §4.10).
    pub min_sample_size: u32,
    /// Per-fetch timeout, seconds (§5).
    pub fetch_timeout_secs: u64,
    /// Per-detector-run timeout, seconds (§5).
    pub detector_run_timeout_secs: u64,
    /// Pipeline lag threshold before it surfaces via health (§7).
    pub pipeline_lag_threshold_secs: i64,
    /// Arbiter ambiguity margin (§4.12 step 3).
    pub ambiguity_margin: f64,
    /// Minutes pre-game closing snapshots target (GLOSSARY: "closing
    /// snapshot").
    pub closing_snapshot_target_minutes: i64,
    /// Performance Tuner cadence, seconds (§4.11 default daily).
    pub tuner_cadence_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_window_secs: 300,
            circuit_breaker_cooldown_secs: 60,
            confidence_floor: 0.55,
            juice_cutoff: -160,
            min_sample_size: 10,
            fetch_timeout_secs: 30,
            detector_run_timeout_secs: 60,
            pipeline_lag_threshold_secs: 300,
            ambiguity_margin: 0.1,
            closing_snapshot_target_minutes: 5,
            tuner_cadence_secs: 86_400,
        }
    }
}

/// Book credibility weight table (§4.4 step 4). Unknown books fall back to
/// 1.0 via [`BookCredibilityTable::weight`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCredibilityTable {
    weights: BTreeMap<String, f64>,
}

impl Default for BookCredibilityTable {
    fn default() -> Self {
        let weights = [
            ("Pinnacle", 3.0),
            ("BookMaker", 2.5),
            ("Circa", 2.3),
            ("BetMGM", 1.8),
            ("Caesars", 1.7),
            ("PointsBet", 1.6),
            ("DraftKings", 1.5),
            ("FanDuel", 1.5),
            ("BetRivers", 1.2),
            ("Barstool", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { weights }
    }
}

impl BookCredibilityTable {
    pub fn weight(&self, book: &str) -> f64 {
        self.weights.get(book).copied().unwrap_or(1.0)
    }
}

/// Ballpark factor classification used by the Total Sweet Spots detector
/// (§4.9). Only three buckets are needed by that detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallparkFactor {
    ExtremeHitters,
    Hitters,
    Neutral,
    Pitchers,
}

impl BallparkFactor {
    /// Multiplier applied to the sweet-spot detector's confidence (no
    /// generalization to other market types per §9 Open Questions: "whether
    /// they generalize to other market types is undetermined and left to
    /// future work" — so this stays local to that one detector).
    pub fn confidence_multiplier(&self) -> f64 {
        match self {
            BallparkFactor::ExtremeHitters => 1.3,
            BallparkFactor::Hitters => 1.15,
            BallparkFactor::Neutral => 1.0,
            BallparkFactor::Pitchers => 0.85,
        }
    }
}

/// Fixed team roster entry backing canonicalization (§4.4 step 1) and
/// ballpark-factor lookup (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamEntry {
    pub canonical_name: String,
    pub abbreviation: String,
    pub market_size: crate::domain::MarketSizeTag,
    pub park: String,
    pub ballpark_factor: BallparkFactor,
}

/// The 30-team MLB roster map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRoster {
    teams: BTreeMap<String, TeamEntry>,
}

impl TeamRoster {
    pub fn canonicalize(&self, alias: &str) -> Option<&TeamEntry> {
        self.teams.get(&alias.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

impl Default for TeamRoster {
    fn default() -> Self {
        use crate::domain::MarketSizeTag::*;
        use BallparkFactor::*;

        let raw: &[(&str, &str, crate::domain::MarketSizeTag, &str, BallparkFactor)] = &[
            ("ARI", "Arizona Diamondbacks", Medium, "Chase Field", Neutral),
            ("ATL", "Atlanta Braves", Large, "Truist Park", Neutral),
            ("BAL", "Baltimore Orioles", Medium, "Camden Yards", Neutral),
            ("BOS", "Boston Red Sox", Large, "Fenway Park", Hitters),
            ("CHC", "Chicago Cubs", Large, "Wrigley Field", Neutral),
            ("CWS", "Chicago White Sox", Large, "Rate Field", Neutral),
            ("CIN", "Cincinnati Reds", Medium, "Great American Ball Park", Hitters),
            ("CLE", "Cleveland Guardians", Medium, "Progressive Field", Neutral),
            ("COL", "Colorado Rockies", Medium, "Coors Field", ExtremeHitters),
            ("DET", "Detroit Tigers", Medium, "Comerica Park", Neutral),
            ("HOU", "Houston Astros", Large, "Minute Maid Park", Neutral),
            ("KC", "Kansas City Royals", Small, "Kauffman Stadium", Neutral),
            ("LAA", "Los Angeles Angels", Large, "Angel Stadium", Neutral),
            ("LAD", "Los Angeles Dodgers", Large, "Dodger Stadium", Pitchers),
            ("MIA", "Miami Marlins", Small, "loanDepot Park", Pitchers),
            ("MIL", "Milwaukee Brewers", Medium, "American Family Field", Neutral),
            ("MIN", "Minnesota Twins", Medium, "Target Field", Neutral),
            ("NYM", "New York Mets", Large, "Citi Field", Neutral),
            ("NYY", "New York Yankees", Large, "Yankee Stadium", Hitters),
            ("OAK", "Athletics", Small, "Sutter Health Park", Pitchers),
            ("PHI", "Philadelphia Phillies", Large, "Citizens Bank Park", Hitters),
            ("PIT", "Pittsburgh Pirates", Small, "PNC Park", Neutral),
            ("SD", "San Diego Padres", Medium, "Petco Park", Pitchers),
            ("SF", "San Francisco Giants", Large, "Oracle Park", Pitchers),
            ("SEA", "Seattle Mariners", Medium, "T-Mobile Park", Pitchers),
            ("STL", "St. Louis Cardinals", Large, "Busch Stadium", Neutral),
            ("TB", "Tampa Bay Rays", Small, "Tropicana Field", Neutral),
            ("TEX", "Texas Rangers", Large, "Globe Life Field", Hitters),
            ("TOR", "Toronto Blue Jays", Large, "Rogers Centre", Neutral),
            ("WSH", "Washington Nationals", Medium, "Nationals Park", Neutral),
        ];

        let mut teams = BTreeMap::new();
        for (abbr, name, size, park, factor) in raw {
            let entry = TeamEntry {
                canonical_name: name.to_string(),
                abbreviation: abbr.to_string(),
                market_size: *size,
                park: park.to_string(),
                ballpark_factor: *factor,
            };
            teams.insert(abbr.to_string(), entry.clone());
            teams.insert(name.to_uppercase(), entry);
        }
        Self { teams }
    }
}

/// Top-level configuration for one running instance of the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_path: String,
    pub adapters: Vec<AdapterConfig>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub book_credibility: BookCredibilityTable,
    #[serde(default)]
    pub team_roster: TeamRoster,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "sharpline.sqlite3".to_string(),
            adapters: Vec::new(),
            defaults: Defaults::default(),
            book_credibility: BookCredibilityTable::default(),
            team_roster: TeamRoster::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, falling back to defaults if the file is
    /// absent; environment variable `SHARPLINE_DATABASE_PATH` overrides the
    /// database path layered over file config.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| CoreError::Fatal(format!("reading config {path:?}: {e}")))?;
            toml::from_str(&text)
                .map_err(|e| CoreError::Fatal(format!("parsing config {path:?}: {e}")))?
        } else {
            AppConfig::default()
        };

        if let Ok(db) = std::env::var("SHARPLINE_DATABASE_PATH") {
            config.database_path = db;
        }

        Ok(config)
    }
}
