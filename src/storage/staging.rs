//! STAGING zone persistence (§4.4): normalized points plus the rejects
//! table the Staging Transformer writes to when a raw row fails validation.

use chrono::Utc;
use rusqlite::params;

use super::Store;
use crate::domain::Market;
use crate::error::Result;

/// One normalized staging row, prior to sharp-tag/quality-score enrichment
/// (that enrichment belongs to CURATED, §4.5).
#[derive(Debug, Clone)]
pub struct StagingPoint {
    pub id: Option<i64>,
    pub game_id: i64,
    pub source: String,
    pub book: String,
    pub market: Market,
    pub collected_at: chrono::DateTime<Utc>,
    pub money_pct: Option<f64>,
    pub bet_pct: Option<f64>,
    pub split_value: Option<String>,
    pub ingestion_sequence: i64,
}

pub fn insert(store: &Store, point: &StagingPoint) -> Result<Option<i64>> {
    let conn = store.lock();
    let changes = conn.execute(
        "INSERT OR IGNORE INTO staging_points
         (game_id, source, book, market, collected_at, money_pct, bet_pct, split_value, ingestion_sequence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            point.game_id,
            point.source,
            point.book,
            point.market.as_str(),
            point.collected_at.to_rfc3339(),
            point.money_pct,
            point.bet_pct,
            point.split_value,
            point.ingestion_sequence,
        ],
    )?;
    if changes == 0 {
        return Ok(None);
    }
    Ok(Some(conn.last_insert_rowid()))
}

pub fn for_game_market(store: &Store, game_id: i64, market: Market) -> Result<Vec<StagingPoint>> {
    let conn = store.lock();
    let mut stmt = conn.prepare_cached(
        "SELECT id, game_id, source, book, market, collected_at, money_pct, bet_pct, split_value, ingestion_sequence
         FROM staging_points
         WHERE game_id = ?1 AND market = ?2
         ORDER BY collected_at, ingestion_sequence",
    )?;
    let rows = stmt.query_map(params![game_id, market.as_str()], row_to_point)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn row_to_point(row: &rusqlite::Row) -> rusqlite::Result<StagingPoint> {
    let market_str: String = row.get(4)?;
    let collected_at_str: String = row.get(5)?;
    Ok(StagingPoint {
        id: row.get(0)?,
        game_id: row.get(1)?,
        source: row.get(2)?,
        book: row.get(3)?,
        market: market_str.parse().unwrap_or(Market::Moneyline),
        collected_at: chrono::DateTime::parse_from_rfc3339(&collected_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        money_pct: row.get(6)?,
        bet_pct: row.get(7)?,
        split_value: row.get(8)?,
        ingestion_sequence: row.get(9)?,
    })
}

/// Persist a rejected raw row with its reason, for the quarantine query
/// (§9 supplement: operators can audit why a row never reached STAGING).
pub fn insert_reject(
    store: &Store,
    source: &str,
    reason: &str,
    detail: &str,
    raw_observation_json: &str,
) -> Result<()> {
    let conn = store.lock();
    conn.execute(
        "INSERT INTO staging_rejects (source, reason, detail, raw_observation_json, rejected_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![source, reason, detail, raw_observation_json, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Quarantine query: rejects grouped by reason within a window, used by the
/// Outbound Interface's health surface.
pub fn reject_counts_by_reason(store: &Store) -> Result<Vec<(String, i64)>> {
    let conn = store.lock();
    let mut stmt = conn.prepare(
        "SELECT reason, COUNT(*) FROM staging_rejects GROUP BY reason ORDER BY COUNT(*) DESC",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_and_queryable() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        conn.execute(
            "INSERT INTO games (home_team_canonical, away_team_canonical, game_date_eastern,
                game_start_utc, park, market_size_tag, daypart)
             VALUES ('Yankees','Red Sox','2026-07-01','2026-07-01T23:00:00Z','Yankee Stadium','Large','Night')",
            [],
        )
        .unwrap();
        drop(conn);

        let point = StagingPoint {
            id: None,
            game_id: 1,
            source: "vsin".into(),
            book: "Circa".into(),
            market: Market::Moneyline,
            collected_at: Utc::now(),
            money_pct: Some(70.0),
            bet_pct: Some(50.0),
            split_value: None,
            ingestion_sequence: 0,
        };
        let id = insert(&store, &point).unwrap();
        assert!(id.is_some());
        let dup = insert(&store, &point).unwrap();
        assert!(dup.is_none());

        let rows = for_game_market(&store, 1, Market::Moneyline).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
