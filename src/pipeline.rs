//! Pipeline orchestration (§2, §5): wires the leaf components — a Source
//! Adapter, the RAW Store, the Staging Transformer, the Curated Builder,
//! the Detector Engine and the Arbiter — into the two cycles the
//! [`crate::scheduler::Scheduler`] drives: one ingest cycle per source, and
//! one detect-and-arbitrate run over a window. Neither cycle is itself a
//! new algorithm; this module only sequences calls other components already
//! expose, the same shape a daemon's `main.rs` uses to hand-wire its own
//! scrape -> detect -> persist loop.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::AppConfig;
use crate::error::Result;
use crate::sources::{FetchWindow, SourceAdapter, SourceId};
use crate::staging::{self, TransformOutcome};
use crate::storage::{raw as raw_store, Store};
use crate::strategy::{catalog, engine};

/// Tally of one source's ingest cycle, logged and folded into `health()`
/// (§6 Outbound Interface, §7 "recoverable errors are tallied in
/// per-component counters").
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestOutcome {
    pub fetched: usize,
    pub raw_inserted: usize,
    pub staged: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Run one source's fetch -> RAW append -> Staging transform cycle.
///
/// `window.end` doubles as the game-start approximation the Staging
/// Transformer needs to resolve/create each `Game` row before a CURATED
/// series exists for it (§9 Open Questions territory: adapters only carry
/// a provider's own `start_time` in their JSON response, which is discarded
/// once converted to the wire-neutral [`crate::domain::Observation`]; every
/// adapter already makes this same approximation internally for its own
/// `collected_at < game_start` pre-game filter, so the pipeline reuses it
/// rather than inventing a second notion of "when does this game start").
pub async fn ingest_source(
    store: &Store,
    config: &AppConfig,
    source: SourceId,
    adapter: &dyn SourceAdapter,
    window: FetchWindow,
) -> Result<IngestOutcome> {
    let observations = match adapter.fetch(window).await {
        Ok(obs) => obs,
        Err(crate::error::CoreError::SourceEmpty) => return Ok(IngestOutcome::default()),
        Err(e) => return Err(e),
    };

    let fetched = observations.len();
    let raw_inserted = raw_store::append(store, source, &observations)?;
    store.set_metadata("last_ingest_at", &Utc::now().to_rfc3339())?;

    let outcomes = staging::transform_batch(store, config, observations, |_external_id| Some(window.end))?;

    let mut outcome = IngestOutcome {
        fetched,
        raw_inserted,
        ..Default::default()
    };
    for result in outcomes {
        match result {
            TransformOutcome::Staged { .. } => outcome.staged += 1,
            TransformOutcome::Duplicate => outcome.duplicates += 1,
            TransformOutcome::Rejected { reason, detail } => {
                outcome.rejected += 1;
                warn!(source = %source, reason, detail, "StagingReject");
            }
        }
    }
    Ok(outcome)
}

/// Build (or extend) the CURATED series for every `(game, market)` touched
/// by a just-completed Staging pass, driven off the games the pass created
/// or updated in `[window_start, window_end)`.
pub fn build_curated_for_window(
    store: &Store,
    config: &AppConfig,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<usize> {
    let games = crate::storage::curated::games_starting_in_window(store, window_start, window_end)?;
    let mut points_built = 0usize;
    for game in &games {
        for market in [
            crate::domain::Market::Moneyline,
            crate::domain::Market::Spread,
            crate::domain::Market::Total,
        ] {
            let ids = crate::curated::build_series(store, config, game.game_id, market, game.game_start_utc)?;
            points_built += ids.len();
        }
    }
    Ok(points_built)
}

/// Tally of one full detect-and-arbitrate run, logged by the caller and
/// exposed to the Outbound Interface (C13, §6 `health()`).
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub candidate_signals: usize,
    pub recommendations: usize,
    pub ambiguous_drops: usize,
    pub juice_drops: usize,
}

/// Run the Detector Engine (C9) over `[window_start, window_end)` against
/// the catalog's current ACTIVE/SHADOW snapshot, then the Arbiter (C12)
/// over the resulting signals — the exact pipeline §2 describes ("Detector
/// Engine -> Arbiter"), used identically for a live pre-game window or a
/// historical backtest window (§2: "using the same code path").
pub fn detect_and_arbitrate(
    store: &Store,
    config: &AppConfig,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<RunOutcome> {
    let variants = catalog::load_all(store)?;
    let evaluable: Vec<_> = variants
        .iter()
        .filter(|v| v.status != crate::domain::VariantStatus::Disabled)
        .cloned()
        .collect();

    let signals = engine::evaluate_window(store, config, &evaluable, window_start, window_end)?;
    crate::storage::signals::insert_candidate_signals(store, &signals)?;
    let candidate_signals = signals.len();

    let arbiter_outcome = crate::arbiter::run(store, config, &variants, signals)?;
    store.set_metadata("arbiter_last_run_at", &Utc::now().to_rfc3339())?;

    Ok(RunOutcome {
        candidate_signals,
        recommendations: arbiter_outcome.recommendations.len(),
        ambiguous_drops: arbiter_outcome.ambiguous_drops,
        juice_drops: arbiter_outcome.juice_drops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::curated as curated_store;

    #[test]
    fn detect_and_arbitrate_on_empty_window_is_a_noop() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        catalog::load_or_seed(&store).unwrap();
        let now = Utc::now();

        let outcome = detect_and_arbitrate(&store, &config, now, now + chrono::Duration::hours(1)).unwrap();
        assert_eq!(outcome.candidate_signals, 0);
        assert_eq!(outcome.recommendations, 0);
    }

    #[test]
    fn build_curated_for_window_only_touches_games_in_range() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let start = Utc::now() + chrono::Duration::days(10);

        let game = crate::domain::Game {
            game_id: 0,
            home_team_canonical: "New York Yankees".into(),
            away_team_canonical: "Boston Red Sox".into(),
            game_date_eastern: start.date_naive(),
            game_start_utc: start,
            park: "Yankee Stadium".into(),
            market_size_tag: crate::domain::MarketSizeTag::Large,
            daypart: crate::domain::Daypart::Night,
            home_score: None,
            away_score: None,
            home_win: None,
            home_cover_spread: None,
            over: None,
            resolved_at: None,
        };
        curated_store::upsert_game(&store, &game).unwrap();

        let points = build_curated_for_window(&store, &config, start - chrono::Duration::hours(1), start).unwrap();
        assert_eq!(points, 0);
    }
}
