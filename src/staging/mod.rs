//! Staging Transformer (C5, §4.4). Consumes newly-appended RAW rows for one
//! source/window, normalizes them, and writes STAGING rows — or a quarantine
//! record when a row can't be normalized.
//!
//! Runs five steps in order: canonicalize teams, normalize timezone, parse
//! odds, compute derived fields, dedupe within the batch. Idempotent:
//! re-running on the same RAW window produces the same
//! STAGING rows, since every write goes through the `UNIQUE` constraint on
//! `(game_id, source, book, market, collected_at)`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::{AppConfig, TeamRoster};
use crate::domain::{Daypart, Game, Market, Observation};
use crate::error::Result;
use crate::storage::{curated, staging as staging_store, Store};

/// Outcome of transforming one RAW observation.
pub enum TransformOutcome {
    Staged { staging_id: i64 },
    Duplicate,
    Rejected { reason: &'static str, detail: String },
}

/// Parse a split cell per §4.4 step 3: moneyline JSON `{home,away}`, or a
/// decimal string for spread/total. Returns `None` (not an error) when the
/// cell is absent; non-parseable non-empty cells are the caller's reject.
fn parse_split_value(market: Market, raw: &Option<String>) -> std::result::Result<Option<String>, String> {
    let Some(raw) = raw else { return Ok(None) };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match market {
        Market::Moneyline => {
            if trimmed.starts_with('{') {
                serde_json::from_str::<serde_json::Value>(trimmed)
                    .map(|_| Some(trimmed.to_string()))
                    .map_err(|e| format!("unparseable moneyline split: {e}"))
            } else if trimmed.parse::<i64>().is_ok() {
                Ok(Some(trimmed.to_string()))
            } else {
                Err(format!("unparseable moneyline split: {trimmed}"))
            }
        }
        Market::Spread | Market::Total => trimmed
            .parse::<f64>()
            .map(|_| Some(trimmed.to_string()))
            .map_err(|e| format!("unparseable {market} split: {e}")),
    }
}

/// Derive the `Daypart` bucket from a local start hour (§3 GLOSSARY).
fn daypart_from_hour(hour: u32) -> Daypart {
    match hour {
        11..=15 => Daypart::Day,
        16..=18 => Daypart::Twilight,
        19..=22 => Daypart::Night,
        _ => Daypart::Primetime,
    }
}

/// Resolve (or create) the `Game` row an observation belongs to, from the
/// canonical home/away team pairing embedded in `game_external_id` by the
/// adapter layer (`"{away}_{home}"` slug convention, §4.1 VSIN/SBD/SBR docs).
pub fn resolve_or_create_game(
    store: &Store,
    roster: &TeamRoster,
    game_external_id: &str,
    game_start_utc: DateTime<Utc>,
) -> std::result::Result<i64, String> {
    let parts: Vec<&str> = game_external_id.split('_').collect();
    if parts.len() < 2 {
        return Err(format!("cannot split game_external_id: {game_external_id}"));
    }
    let away_alias = parts[0];
    let home_alias = parts[1..].join("_");

    let away = roster
        .canonicalize(away_alias)
        .ok_or_else(|| format!("unknown_team: {away_alias}"))?;
    let home = roster
        .canonicalize(&home_alias)
        .ok_or_else(|| format!("unknown_team: {home_alias}"))?;

    let eastern_offset = chrono::FixedOffset::west_opt(4 * 3600).unwrap();
    let local = game_start_utc.with_timezone(&eastern_offset);

    let game = Game {
        game_id: 0,
        home_team_canonical: home.canonical_name.clone(),
        away_team_canonical: away.canonical_name.clone(),
        game_date_eastern: local.date_naive(),
        game_start_utc,
        park: home.park.clone(),
        market_size_tag: home.market_size,
        daypart: daypart_from_hour(local.format("%H").to_string().parse().unwrap_or(19)),
        home_score: None,
        away_score: None,
        home_win: None,
        home_cover_spread: None,
        over: None,
        resolved_at: None,
    };

    curated::upsert_game(store, &game).map_err(|e| e.to_string())
}

/// Transform one batch of RAW observations (already deduped to the
/// `(game_id, source, book, market, collected_at)` equivalence class per
/// §4.4 step 5) into STAGING rows.
pub fn transform_batch(
    store: &Store,
    config: &AppConfig,
    observations: Vec<Observation>,
    game_start_lookup: impl Fn(&str) -> Option<DateTime<Utc>>,
) -> Result<Vec<TransformOutcome>> {
    let roster = &config.team_roster;

    // Step 5: dedupe within this batch by (source, book, game_external_id,
    // market), keeping the greatest (collected_at, ingestion_sequence).
    let mut best: HashMap<(String, String, String, Market), &Observation> = HashMap::new();
    for obs in &observations {
        let key = (
            obs.source.clone(),
            obs.book.clone(),
            obs.game_external_id.clone(),
            obs.market,
        );
        best.entry(key)
            .and_modify(|existing| {
                if (obs.collected_at, obs.ingestion_sequence)
                    > (existing.collected_at, existing.ingestion_sequence)
                {
                    *existing = obs;
                }
            })
            .or_insert(obs);
    }

    let mut outcomes = Vec::with_capacity(best.len());
    for obs in best.into_values() {
        let Some(game_start) = game_start_lookup(&obs.game_external_id) else {
            outcomes.push(reject(
                store,
                &obs,
                "unknown_game",
                "no scheduled game start known for this external id",
            )?);
            continue;
        };

        let game_id = match resolve_or_create_game(store, roster, &obs.game_external_id, game_start) {
            Ok(id) => id,
            Err(detail) => {
                outcomes.push(reject(store, &obs, "unknown_team", &detail)?);
                continue;
            }
        };

        let split_value = match parse_split_value(obs.market, &obs.split_value) {
            Ok(v) => v,
            Err(detail) => {
                outcomes.push(reject(store, &obs, "unparseable_odds", &detail)?);
                continue;
            }
        };

        let point = staging_store::StagingPoint {
            id: None,
            game_id,
            source: obs.source.clone(),
            book: obs.book.clone(),
            market: obs.market,
            collected_at: obs.collected_at,
            money_pct: crate::domain::Observation::sanitize_pct(obs.money_pct),
            bet_pct: crate::domain::Observation::sanitize_pct(obs.bet_pct),
            split_value,
            ingestion_sequence: obs.ingestion_sequence,
        };

        match staging_store::insert(store, &point)? {
            Some(staging_id) => outcomes.push(TransformOutcome::Staged { staging_id }),
            None => outcomes.push(TransformOutcome::Duplicate),
        }
    }

    Ok(outcomes)
}

fn reject(
    store: &Store,
    obs: &Observation,
    reason: &'static str,
    detail: &str,
) -> Result<TransformOutcome> {
    let raw_json = serde_json::to_string(obs).unwrap_or_default();
    staging_store::insert_reject(store, &obs.source, reason, detail, &raw_json)?;
    Ok(TransformOutcome::Rejected {
        reason,
        detail: detail.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Market;

    fn sample_observation(collected_at: DateTime<Utc>, seq: i64) -> Observation {
        Observation {
            ingestion_id: None,
            source: "vsin".into(),
            book: "Circa".into(),
            game_external_id: "BOS_NYY".into(),
            market: Market::Moneyline,
            collected_at,
            ingestion_sequence: seq,
            endpoint: "https://example.test".into(),
            money_pct: Some(72.0),
            bet_pct: Some(55.0),
            split_value: Some("{\"home\":-150,\"away\":130}".into()),
            home_bet_count: Some(1200),
            away_bet_count: Some(900),
            raw_payload: b"row".to_vec(),
        }
    }

    #[test]
    fn dedupes_batch_to_latest_per_equivalence_class() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let start = Utc::now() + chrono::Duration::hours(3);

        let earlier = sample_observation(start - chrono::Duration::minutes(10), 0);
        let later = sample_observation(start - chrono::Duration::minutes(5), 1);

        let outcomes = transform_batch(&store, &config, vec![earlier, later], |_| Some(start)).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], TransformOutcome::Staged { .. }));
    }

    #[test]
    fn unknown_team_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let start = Utc::now() + chrono::Duration::hours(3);
        let mut obs = sample_observation(start - chrono::Duration::minutes(10), 0);
        obs.game_external_id = "ZZZ_YYY".into();

        let outcomes = transform_batch(&store, &config, vec![obs], |_| Some(start)).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            TransformOutcome::Rejected { reason: "unknown_team", .. }
        ));
    }

    #[test]
    fn unparseable_split_value_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let start = Utc::now() + chrono::Duration::hours(3);
        let mut obs = sample_observation(start - chrono::Duration::minutes(10), 0);
        obs.split_value = Some("not-json-or-number".into());

        let outcomes = transform_batch(&store, &config, vec![obs], |_| Some(start)).unwrap();
        assert!(matches!(
            outcomes[0],
            TransformOutcome::Rejected { reason: "unparseable_odds", .. }
        ));
    }
}
