//! Storage layer: one `rusqlite` connection shared across the three zones
//! (RAW, STAGING, CURATED) plus the strategy catalog and downstream tables
//! (§6 "Persisted state"). A single file, WAL mode, `parking_lot::Mutex`
//! guarding the connection, generalized from one signal table to the whole
//! schema.

pub mod backtest;
pub mod curated;
pub mod raw;
pub mod signals;
pub mod staging;

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::Result;
use crate::sources::SourceId;

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
"#;

/// Schema shared by all three zones. One physical `raw_<source>` table per
/// [`SourceId`] variant (§6: "one table per source under `raw.*`"), plus the
/// normalized `staging_points`/`staging_rejects`, the authoritative
/// `curated_points`/`games`, and the strategy/backtest/recommendation tables.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    game_id INTEGER PRIMARY KEY AUTOINCREMENT,
    home_team_canonical TEXT NOT NULL,
    away_team_canonical TEXT NOT NULL,
    game_date_eastern TEXT NOT NULL,
    game_start_utc TEXT NOT NULL,
    park TEXT NOT NULL,
    market_size_tag TEXT NOT NULL,
    daypart TEXT NOT NULL,
    home_score INTEGER,
    away_score INTEGER,
    home_win INTEGER,
    home_cover_spread INTEGER,
    over INTEGER,
    resolved_at TEXT,
    UNIQUE(home_team_canonical, away_team_canonical, game_date_eastern)
);

CREATE INDEX IF NOT EXISTS idx_games_start ON games(game_start_utc);
CREATE INDEX IF NOT EXISTS idx_games_unresolved ON games(resolved_at) WHERE resolved_at IS NULL;

CREATE TABLE IF NOT EXISTS staging_points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(game_id),
    source TEXT NOT NULL,
    book TEXT NOT NULL,
    market TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    money_pct REAL,
    bet_pct REAL,
    split_value TEXT,
    ingestion_sequence INTEGER NOT NULL,
    UNIQUE(game_id, source, book, market, collected_at)
);

CREATE INDEX IF NOT EXISTS idx_staging_game_market
    ON staging_points(game_id, market, collected_at);

CREATE TABLE IF NOT EXISTS staging_rejects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    reason TEXT NOT NULL,
    detail TEXT NOT NULL,
    raw_observation_json TEXT NOT NULL,
    rejected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_staging_rejects_reason ON staging_rejects(reason, rejected_at);

CREATE TABLE IF NOT EXISTS curated_points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(game_id),
    source TEXT NOT NULL,
    book TEXT NOT NULL,
    market TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    money_pct REAL,
    bet_pct REAL,
    money_minus_bet REAL,
    sharp_tag TEXT NOT NULL,
    timing_bucket TEXT NOT NULL,
    quality_score REAL NOT NULL,
    split_value TEXT,
    line_movement_from_prev REAL,
    book_credibility_weight REAL NOT NULL,
    UNIQUE(game_id, source, book, market, collected_at)
);

CREATE INDEX IF NOT EXISTS idx_curated_game_market_book
    ON curated_points(game_id, market, book, collected_at);
CREATE INDEX IF NOT EXISTS idx_curated_timing_bucket ON curated_points(timing_bucket);

CREATE TABLE IF NOT EXISTS strategy_variants (
    strategy_name TEXT NOT NULL,
    variant_name TEXT NOT NULL,
    description TEXT NOT NULL,
    markets_json TEXT NOT NULL,
    thresholds_json TEXT NOT NULL,
    min_sample_size INTEGER NOT NULL,
    status TEXT NOT NULL,
    last_tuned_at TEXT,
    edge_weight REAL NOT NULL,
    PRIMARY KEY (strategy_name, variant_name)
);

CREATE TABLE IF NOT EXISTS candidate_signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL,
    market TEXT NOT NULL,
    book TEXT NOT NULL,
    source TEXT NOT NULL,
    strategy_name TEXT NOT NULL,
    variant_name TEXT NOT NULL,
    fired_at TEXT NOT NULL,
    side TEXT NOT NULL,
    raw_confidence REAL NOT NULL,
    features_json TEXT NOT NULL,
    triggering_point_ids_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_candidate_signals_game
    ON candidate_signals(game_id, market, book);

CREATE TABLE IF NOT EXISTS recommendations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL,
    game_id INTEGER NOT NULL,
    market TEXT NOT NULL,
    book TEXT NOT NULL,
    side TEXT NOT NULL,
    final_confidence REAL NOT NULL,
    contributing_variants_json TEXT NOT NULL,
    juice_check TEXT NOT NULL,
    expected_roi_estimate REAL,
    rank INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(run_id, game_id, market, book)
);

CREATE INDEX IF NOT EXISTS idx_recommendations_run ON recommendations(run_id, rank);

CREATE TABLE IF NOT EXISTS backtest_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_name TEXT NOT NULL,
    variant_name TEXT NOT NULL,
    market TEXT NOT NULL,
    window_start TEXT NOT NULL,
    window_end TEXT NOT NULL,
    bets_count INTEGER NOT NULL,
    wins INTEGER NOT NULL,
    win_rate REAL NOT NULL,
    roi_at_minus_110 REAL NOT NULL,
    roi_using_actual_odds REAL,
    drawdown REAL NOT NULL,
    confidence_tier TEXT NOT NULL,
    sample_sufficient INTEGER NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_backtest_results_variant
    ON backtest_results(strategy_name, variant_name, market, window_end DESC);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
) WITHOUT ROWID;
"#;

/// Shared handle to the sqlite-backed store. Cloneable (wraps an `Arc`).
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(SCHEMA_SQL)?;
        for source in SourceId::all() {
            conn.execute_batch(&raw::create_table_sql(source))?;
        }

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!(mode = %journal_mode, "WAL mode not active");
        }
        info!(path, "storage opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        for source in SourceId::all() {
            conn.execute_batch(&raw::create_table_sql(source))?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .ok())
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_and_creates_schema() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='games'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn creates_one_raw_table_per_source() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        for source in SourceId::all() {
            let table = format!("raw_{}", source.as_str());
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [&table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn schema_survives_reopen_of_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sharpline.sqlite3");
        let path_str = path.to_str().unwrap();

        {
            let store = Store::open(path_str).unwrap();
            store.set_metadata("test_key", "test_value").unwrap();
        }

        let reopened = Store::open(path_str).unwrap();
        assert_eq!(reopened.get_metadata("test_key").unwrap().as_deref(), Some("test_value"));
    }
}
