//! RAW zone (C4, §4.3): append-only capture of every [`Observation`], one
//! physical table per [`SourceId`] so a provider-specific backfill or replay
//! never touches another source's rows (§9 REDESIGN FLAGS: variant-typed
//! source boundary). Never mutated after insert, never deleted except by an
//! explicit retention sweep.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use super::Store;
use crate::domain::Observation;
use crate::error::Result;
use crate::sources::SourceId;

pub(super) fn create_table_sql(source: SourceId) -> String {
    let table = format!("raw_{}", source.as_str());
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            ingestion_id INTEGER PRIMARY KEY AUTOINCREMENT,
            book TEXT NOT NULL,
            game_external_id TEXT NOT NULL,
            market TEXT NOT NULL,
            collected_at TEXT NOT NULL,
            ingestion_sequence INTEGER NOT NULL,
            endpoint TEXT NOT NULL,
            money_pct REAL,
            bet_pct REAL,
            split_value TEXT,
            home_bet_count INTEGER,
            away_bet_count INTEGER,
            raw_payload BLOB NOT NULL,
            inserted_at TEXT NOT NULL,
            UNIQUE(book, game_external_id, market, collected_at)
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_game
            ON {table}(game_external_id, market, collected_at);
        "#
    )
}

/// Append one batch of Observations for a single source's table. Idempotent:
/// the `(book, game_external_id, market, collected_at)` unique constraint
/// makes re-ingesting an already-seen point a no-op (§4.3: "append-only,
/// idempotent on replay").
pub fn append(store: &Store, source: SourceId, observations: &[Observation]) -> Result<usize> {
    if observations.is_empty() {
        return Ok(0);
    }
    let table = format!("raw_{}", source.as_str());
    let conn = store.lock();
    conn.execute("BEGIN IMMEDIATE", [])?;

    let mut inserted = 0usize;
    {
        let sql = format!(
            "INSERT OR IGNORE INTO {table}
             (book, game_external_id, market, collected_at, ingestion_sequence, endpoint,
              money_pct, bet_pct, split_value, home_bet_count, away_bet_count, raw_payload, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let now = Utc::now();
        for obs in observations {
            let changes = stmt.execute(params![
                obs.book,
                obs.game_external_id,
                obs.market.as_str(),
                obs.collected_at.to_rfc3339(),
                obs.ingestion_sequence,
                obs.endpoint,
                obs.money_pct,
                obs.bet_pct,
                obs.split_value,
                obs.home_bet_count,
                obs.away_bet_count,
                obs.raw_payload,
                now.to_rfc3339(),
            ])?;
            inserted += changes;
        }
    }

    conn.execute("COMMIT", [])?;
    debug!(source = %source, inserted, "appended raw observations");
    Ok(inserted)
}

/// Read back observations for one source collected within `[since, until)`,
/// in ingestion order, for the Staging Transformer to consume (§4.3).
pub fn read_since(
    store: &Store,
    source: SourceId,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<Observation>> {
    let table = format!("raw_{}", source.as_str());
    let conn = store.lock();
    let sql = format!(
        "SELECT ingestion_id, book, game_external_id, market, collected_at, ingestion_sequence,
                endpoint, money_pct, bet_pct, split_value, home_bet_count, away_bet_count, raw_payload
         FROM {table}
         WHERE collected_at >= ?1 AND collected_at < ?2
         ORDER BY collected_at, ingestion_sequence"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(
        params![since.to_rfc3339(), until.to_rfc3339()],
        |row| -> rusqlite::Result<Observation> {
            let market_str: String = row.get(3)?;
            let collected_at_str: String = row.get(4)?;
            Ok(Observation {
                ingestion_id: row.get(0)?,
                source: source.as_str().to_string(),
                book: row.get(1)?,
                game_external_id: row.get(2)?,
                market: market_str.parse().unwrap_or(crate::domain::Market::Moneyline),
                collected_at: DateTime::parse_from_rfc3339(&collected_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                ingestion_sequence: row.get(5)?,
                endpoint: row.get(6)?,
                money_pct: row.get(7)?,
                bet_pct: row.get(8)?,
                split_value: row.get(9)?,
                home_bet_count: row.get(10)?,
                away_bet_count: row.get(11)?,
                raw_payload: row.get(12)?,
            })
        },
    )?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Retention sweep: delete rows older than `cutoff` across every source
/// table. The only permitted deletion path for RAW (§4.3 Non-goals: "no
/// retention policy is specified beyond an operator-configured sweep").
pub fn sweep_older_than(store: &Store, cutoff: DateTime<Utc>) -> Result<usize> {
    let conn = store.lock();
    let mut deleted = 0usize;
    for source in SourceId::all() {
        let table = format!("raw_{}", source.as_str());
        let sql = format!("DELETE FROM {table} WHERE collected_at < ?1");
        deleted += conn.execute(&sql, params![cutoff.to_rfc3339()])?;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Market;

    fn sample_obs(seq: i64, collected_at: DateTime<Utc>) -> Observation {
        Observation {
            ingestion_id: None,
            source: "vsin".to_string(),
            book: "Circa".to_string(),
            game_external_id: "nyy_bos".to_string(),
            market: Market::Moneyline,
            collected_at,
            ingestion_sequence: seq,
            endpoint: "https://example.test".to_string(),
            money_pct: Some(72.0),
            bet_pct: Some(55.0),
            split_value: Some("-145".to_string()),
            home_bet_count: Some(1200),
            away_bet_count: Some(900),
            raw_payload: b"row".to_vec(),
        }
    }

    #[test]
    fn append_then_read_back_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let obs = vec![sample_obs(0, now)];
        let inserted = append(&store, SourceId::Vsin, &obs).unwrap();
        assert_eq!(inserted, 1);

        let read = read_since(
            &store,
            SourceId::Vsin,
            now - chrono::Duration::seconds(1),
            now + chrono::Duration::seconds(1),
        )
        .unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].book, "Circa");
    }

    #[test]
    fn append_is_idempotent_on_replay() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let obs = vec![sample_obs(0, now)];
        append(&store, SourceId::Vsin, &obs).unwrap();
        let second = append(&store, SourceId::Vsin, &obs).unwrap();
        assert_eq!(second, 0);
    }
}
