//! Persistence for Detector Engine output and Arbiter output
//! (`candidate_signals`, `recommendations`).

use chrono::Utc;
use rusqlite::params;

use super::Store;
use crate::domain::{CandidateSignal, ContributingVariant, JuiceCheck, Market, Recommendation, Side};
use crate::error::Result;

pub fn insert_candidate_signal(store: &Store, signal: &CandidateSignal) -> Result<i64> {
    let conn = store.lock();
    conn.execute(
        "INSERT INTO candidate_signals
         (game_id, market, book, source, strategy_name, variant_name, fired_at, side,
          raw_confidence, features_json, triggering_point_ids_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            signal.game_id,
            signal.market.as_str(),
            signal.book,
            signal.source,
            signal.strategy_name,
            signal.variant_name,
            signal.fired_at.to_rfc3339(),
            side_str(signal.side),
            signal.raw_confidence,
            serde_json::to_string(&signal.features).unwrap_or_default(),
            serde_json::to_string(&signal.triggering_point_ids).unwrap_or_default(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_candidate_signals(store: &Store, signals: &[CandidateSignal]) -> Result<usize> {
    for signal in signals {
        insert_candidate_signal(store, signal)?;
    }
    Ok(signals.len())
}

pub fn insert_recommendation(store: &Store, rec: &Recommendation) -> Result<i64> {
    let conn = store.lock();
    conn.execute(
        "INSERT INTO recommendations
         (run_id, game_id, market, book, side, final_confidence, contributing_variants_json,
          juice_check, expected_roi_estimate, rank, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(run_id, game_id, market, book) DO UPDATE SET
            side=excluded.side,
            final_confidence=excluded.final_confidence,
            contributing_variants_json=excluded.contributing_variants_json,
            juice_check=excluded.juice_check,
            expected_roi_estimate=excluded.expected_roi_estimate,
            rank=excluded.rank",
        params![
            rec.run_id,
            rec.game_id,
            rec.market.as_str(),
            rec.book,
            side_str(rec.side),
            rec.final_confidence,
            serde_json::to_string(&rec.contributing_variants).unwrap_or_default(),
            juice_str(rec.juice_check),
            rec.expected_roi_estimate,
            rec.rank,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn recommendations_for_run(store: &Store, run_id: i64) -> Result<Vec<Recommendation>> {
    let conn = store.lock();
    let mut stmt = conn.prepare(
        "SELECT run_id, game_id, market, book, side, final_confidence,
                contributing_variants_json, juice_check, expected_roi_estimate, rank
         FROM recommendations WHERE run_id = ?1 ORDER BY rank ASC",
    )?;
    let rows = stmt.query_map(params![run_id], row_to_recommendation)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn latest_recommendations(store: &Store, min_confidence: f64, limit: i64) -> Result<Vec<Recommendation>> {
    let conn = store.lock();
    let latest_run: Option<i64> = conn
        .query_row("SELECT MAX(run_id) FROM recommendations", [], |row| row.get(0))
        .ok()
        .flatten();
    let Some(run_id) = latest_run else { return Ok(Vec::new()) };
    let mut stmt = conn.prepare(
        "SELECT run_id, game_id, market, book, side, final_confidence,
                contributing_variants_json, juice_check, expected_roi_estimate, rank
         FROM recommendations WHERE run_id = ?1 AND final_confidence >= ?2
         ORDER BY final_confidence DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![run_id, min_confidence, limit], row_to_recommendation)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn side_str(side: Side) -> &'static str {
    side.as_str()
}

fn parse_side(s: &str) -> Side {
    match s {
        "AWAY" => Side::Away,
        "OVER" => Side::Over,
        "UNDER" => Side::Under,
        _ => Side::Home,
    }
}

fn juice_str(j: JuiceCheck) -> &'static str {
    match j {
        JuiceCheck::Passed => "PASSED",
        JuiceCheck::NotApplicable => "NOT_APPLICABLE",
        JuiceCheck::Rejected => "REJECTED",
    }
}

fn parse_juice(s: &str) -> JuiceCheck {
    match s {
        "PASSED" => JuiceCheck::Passed,
        "REJECTED" => JuiceCheck::Rejected,
        _ => JuiceCheck::NotApplicable,
    }
}

fn row_to_recommendation(row: &rusqlite::Row) -> rusqlite::Result<Recommendation> {
    let market_str: String = row.get(2)?;
    let side_str: String = row.get(4)?;
    let variants_json: String = row.get(6)?;
    let juice_str_val: String = row.get(7)?;
    let contributing_variants: Vec<ContributingVariant> =
        serde_json::from_str(&variants_json).unwrap_or_default();
    Ok(Recommendation {
        run_id: row.get(0)?,
        game_id: row.get(1)?,
        market: market_str.parse::<Market>().unwrap_or(Market::Moneyline),
        book: row.get(3)?,
        side: parse_side(&side_str),
        final_confidence: row.get(5)?,
        contributing_variants,
        juice_check: parse_juice(&juice_str_val),
        expected_roi_estimate: row.get(8)?,
        rank: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn insert_and_fetch_latest_recommendations() {
        let store = Store::open_in_memory().unwrap();
        let rec = Recommendation {
            run_id: 1,
            game_id: 1,
            market: Market::Moneyline,
            book: "Circa".into(),
            side: Side::Home,
            final_confidence: 0.72,
            contributing_variants: vec![ContributingVariant {
                strategy_name: "sharp_action".into(),
                variant_name: "SHARP_STRONG".into(),
                weight: 1.0,
                raw_confidence: 0.72,
            }],
            juice_check: JuiceCheck::Passed,
            expected_roi_estimate: Some(0.04),
            rank: 1,
        };
        insert_recommendation(&store, &rec).unwrap();
        let fetched = latest_recommendations(&store, 0.5, 10).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].book, "Circa");
        let _ = BTreeMap::<String, f64>::new();
    }
}
