//! Game Outcome Resolver (C7, §4.6): polls MLB Stats for completed games and
//! fills `OutcomeRecord`/`games.{home_score,away_score,home_win,...}`.
//!
//! The lookahead invariant ("a Recommendation emitted at time T may not
//! consult OutcomeRecords with resolution timestamp ≤ T") is enforced here
//! via [`Game::resolved_before`] rather than trusted to callers — any
//! consumer that wants outcomes as of some instant must go through
//! [`outcomes_resolved_before`].

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::config::TeamRoster;
use crate::domain::{Market, OutcomeRecord};
use crate::error::Result;
use crate::sources::mlb_stats::{CompletedGame, MlbStatsAdapter};
use crate::storage::{curated, Store};

/// Most recent pre-close line for `market` across every book/source, parsed
/// to a number — used to grade `home_cover_spread`/`over` against whatever
/// the market settled at, the same closing-line convention the Backtester
/// uses per-signal.
fn latest_line_value(store: &Store, game_id: i64, market: Market) -> Option<f64> {
    curated::for_game(store, game_id, market)
        .ok()?
        .into_iter()
        .max_by_key(|p| p.collected_at)
        .and_then(|p| p.split_value)
        .and_then(|s| s.parse::<f64>().ok())
}

/// Resolve one calendar date's completed games against the roster and write
/// outcomes into `games`. Games whose canonical team names aren't already
/// present in the store (no betting data was ever ingested for them) are
/// skipped — there is nothing for a Recommendation to resolve against.
pub async fn resolve_date(
    store: &Store,
    roster: &TeamRoster,
    adapter: &MlbStatsAdapter,
    date: NaiveDate,
) -> Result<Vec<OutcomeRecord>> {
    let completed = adapter.fetch_completed_games(date).await?;
    let mut records = Vec::new();

    for game in completed {
        match resolve_one(store, roster, &game) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warn!(game_pk = game.game_pk, error = %e, "failed to resolve game outcome"),
        }
    }

    info!(date = %date, resolved = records.len(), "game outcome resolution pass complete");
    Ok(records)
}

fn resolve_one(
    store: &Store,
    roster: &TeamRoster,
    game: &CompletedGame,
) -> Result<Option<OutcomeRecord>> {
    let Some(home) = roster.canonicalize(&game.home_team_raw) else {
        return Ok(None);
    };
    let Some(away) = roster.canonicalize(&game.away_team_raw) else {
        return Ok(None);
    };

    let conn = store.lock();
    let found: Option<i64> = conn
        .query_row(
            "SELECT game_id FROM games WHERE home_team_canonical = ?1 AND away_team_canonical = ?2
             AND game_start_utc < ?3 AND resolved_at IS NULL
             ORDER BY game_start_utc DESC LIMIT 1",
            rusqlite::params![
                home.canonical_name,
                away.canonical_name,
                game.resolution_timestamp.to_rfc3339()
            ],
            |row| row.get(0),
        )
        .ok();
    drop(conn);

    let Some(game_id) = found else {
        return Ok(None);
    };

    let Some(mut stored_game) = curated::get_game(store, game_id)? else {
        return Ok(None);
    };

    let home_win = game.home_score > game.away_score;
    let margin = (game.home_score - game.away_score) as f64;
    let total_runs = (game.home_score + game.away_score) as f64;

    let home_cover_spread =
        latest_line_value(store, game_id, Market::Spread).map(|line| margin + line > 0.0);
    let over = latest_line_value(store, game_id, Market::Total).map(|line| total_runs > line);

    stored_game.home_score = Some(game.home_score);
    stored_game.away_score = Some(game.away_score);
    stored_game.home_win = Some(home_win);
    stored_game.home_cover_spread = home_cover_spread;
    stored_game.over = over;
    stored_game.resolved_at = Some(game.resolution_timestamp);
    curated::upsert_game(store, &stored_game)?;

    Ok(Some(OutcomeRecord {
        game_id,
        home_score: game.home_score,
        away_score: game.away_score,
        home_win,
        home_cover_spread,
        over,
        resolution_timestamp: game.resolution_timestamp,
    }))
}

/// The lookahead boundary check (§4.6 invariant): returns the subset of
/// `game_ids` whose outcome was resolved strictly before `as_of`.
pub fn outcomes_resolved_before(
    store: &Store,
    game_ids: &[i64],
    as_of: DateTime<Utc>,
) -> Result<Vec<i64>> {
    let mut resolved = Vec::new();
    for &game_id in game_ids {
        if let Some(game) = curated::get_game(store, game_id)? {
            if game.resolved_before(as_of) {
                resolved.push(game_id);
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Daypart, Game, MarketSizeTag};

    #[test]
    fn outcomes_resolved_before_enforces_lookahead_boundary() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();

        let mut game = Game {
            game_id: 0,
            home_team_canonical: "New York Yankees".into(),
            away_team_canonical: "Boston Red Sox".into(),
            game_date_eastern: now.date_naive(),
            game_start_utc: now - chrono::Duration::hours(4),
            park: "Yankee Stadium".into(),
            market_size_tag: MarketSizeTag::Large,
            daypart: Daypart::Night,
            home_score: Some(5),
            away_score: Some(2),
            home_win: Some(true),
            home_cover_spread: None,
            over: None,
            resolved_at: Some(now - chrono::Duration::minutes(10)),
        };
        let game_id = curated::upsert_game(&store, &game).unwrap();
        game.game_id = game_id;

        let before_resolution = now - chrono::Duration::minutes(20);
        let after_resolution = now;

        assert!(outcomes_resolved_before(&store, &[game_id], before_resolution)
            .unwrap()
            .is_empty());
        assert_eq!(
            outcomes_resolved_before(&store, &[game_id], after_resolution).unwrap(),
            vec![game_id]
        );
    }
}
