//! Detector Engine (C9, §4.8): runs every ACTIVE/SHADOW variant's detector
//! function over one evaluation window, scores confidence, and returns
//! signals in the deterministic sort order `CandidateSignal::sort_key`
//! demands (§8 "Deterministic detection" invariant).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::config::AppConfig;
use crate::domain::{CandidateSignal, CuratedPoint, Market, StrategyVariant, VariantStatus};
use crate::error::Result;
use crate::storage::{curated as curated_store, Store};

use super::detectors::{dispatch, DetectorContext};

/// One game/book's worth of series data across all three markets, prebuilt
/// once per game so every market's detector run can borrow siblings/other
/// books without re-querying storage per variant.
struct GameBookSeries {
    game_id: i64,
    book: String,
    source: String,
    by_market: BTreeMap<Market, Vec<CuratedPoint>>,
    closing_by_market: BTreeMap<Market, CuratedPoint>,
}

fn load_game_book_series(
    store: &Store,
    game_id: i64,
    config: &AppConfig,
    game_start_utc: DateTime<Utc>,
) -> Result<Vec<GameBookSeries>> {
    let mut by_book: BTreeMap<(String, String), GameBookSeries> = BTreeMap::new();

    for market in [Market::Moneyline, Market::Spread, Market::Total] {
        let points = curated_store::for_game(store, game_id, market)?;
        let closing = crate::curated::closing_snapshot(store, config, game_id, market, game_start_utc)?;

        for point in points {
            let key = (point.source.clone(), point.book.clone());
            let entry = by_book.entry(key.clone()).or_insert_with(|| GameBookSeries {
                game_id,
                book: key.1.clone(),
                source: key.0.clone(),
                by_market: BTreeMap::new(),
                closing_by_market: BTreeMap::new(),
            });
            entry.by_market.entry(market).or_default().push(point);
        }
        for point in closing {
            let key = (point.source.clone(), point.book.clone());
            if let Some(entry) = by_book.get_mut(&key) {
                entry.closing_by_market.insert(market, point);
            }
        }
    }

    for entry in by_book.values_mut() {
        for series in entry.by_market.values_mut() {
            series.sort_by_key(|p| p.collected_at);
        }
    }

    Ok(by_book.into_values().collect())
}

/// Run every variant's detector against every `(game, book, market)` series
/// known for the given game, producing raw-confidence candidate signals.
/// `variants` should already be filtered to the subset the caller wants
/// evaluated (e.g. ACTIVE + SHADOW, via [`super::catalog::load_all`]).
pub fn evaluate_game(
    store: &Store,
    config: &AppConfig,
    variants: &[StrategyVariant],
    game_id: i64,
    game_start_utc: DateTime<Utc>,
) -> Result<Vec<CandidateSignal>> {
    let game_books = load_game_book_series(store, game_id, config, game_start_utc)?;
    let mut signals = Vec::new();

    let game_meta = curated_store::get_game(store, game_id)?;
    let market_size = game_meta
        .as_ref()
        .map(|g| g.market_size_tag)
        .unwrap_or(crate::domain::MarketSizeTag::Medium);
    let daypart = game_meta
        .as_ref()
        .map(|g| g.daypart)
        .unwrap_or(crate::domain::Daypart::Night);
    let ballpark_factor = game_meta
        .as_ref()
        .and_then(|g| config.team_roster.canonicalize(&g.home_team_canonical))
        .map(|t| t.ballpark_factor)
        .unwrap_or(crate::config::BallparkFactor::Neutral);

    for gb in &game_books {
        for (&market, series) in &gb.by_market {
            if series.is_empty() {
                continue;
            }
            let closing = gb.closing_by_market.get(&market);

            let sibling_markets: BTreeMap<Market, CuratedPoint> = gb
                .closing_by_market
                .iter()
                .filter(|(&m, _)| m != market)
                .map(|(&m, p)| (m, p.clone()))
                .collect();

            let other_books_closing: Vec<CuratedPoint> = game_books
                .iter()
                .filter(|other| other.book != gb.book)
                .filter_map(|other| other.closing_by_market.get(&market).cloned())
                .collect();

            let team_historical_bet_pct: Vec<f64> = game_meta
                .as_ref()
                .map(|g| {
                    curated_store::team_historical_bet_pct(
                        store,
                        &g.home_team_canonical,
                        market,
                        g.game_start_utc,
                        game_id,
                    )
                })
                .transpose()?
                .unwrap_or_default();

            let ctx = DetectorContext {
                game_id,
                market,
                book: gb.book.clone(),
                source: gb.source.clone(),
                series,
                closing,
                market_size,
                ballpark_factor,
                daypart,
                sibling_markets: &sibling_markets,
                other_books_closing: &other_books_closing,
                team_historical_bet_pct: &team_historical_bet_pct,
            };

            for variant in variants {
                if variant.status == VariantStatus::Disabled || !variant.applies_to(market) {
                    continue;
                }
                let mut fired = dispatch(&variant.strategy_name, variant, &ctx);
                for signal in fired.iter_mut() {
                    signal.raw_confidence = score_confidence(signal, variant, &ctx);
                }
                signals.extend(fired);
            }
        }
    }

    signals.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    Ok(signals)
}

/// Public Detector Engine entry point (§4.8): `evaluate(window_start,
/// window_end, variants_subset?)`. Evaluates every game whose scheduled
/// start falls in `[window_start, window_end)` against `variants` — the
/// same function whether the window is a live pre-game slice or a
/// historical backtest range (§2: "using the same code path").
///
/// Per-game evaluation is embarrassingly parallel (§5), so games run
/// concurrently via rayon; the final sort by [`CandidateSignal::sort_key`]
/// restores the deterministic, order-stable output §8 requires regardless
/// of which thread finished first.
pub fn evaluate_window(
    store: &Store,
    config: &AppConfig,
    variants: &[StrategyVariant],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<CandidateSignal>> {
    let games = curated_store::games_starting_in_window(store, window_start, window_end)?;

    let per_game: Vec<Result<Vec<CandidateSignal>>> = games
        .par_iter()
        .map(|game| evaluate_game(store, config, variants, game.game_id, game.game_start_utc))
        .collect();

    let mut signals = Vec::new();
    for result in per_game {
        signals.extend(result?);
    }
    signals.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    Ok(signals)
}

/// Apply the confidence pipeline on top of a detector's raw base
/// confidence (§4.8): book credibility, timing boost, multi-book consensus
/// count, reverse-line-movement validation.
fn score_confidence(signal: &CandidateSignal, variant: &StrategyVariant, ctx: &DetectorContext) -> f64 {
    let mut confidence = signal.raw_confidence;

    if let Some(closing) = ctx.closing {
        confidence *= closing.book_credibility_weight.max(0.1) / 3.0;
        confidence *= closing.timing_bucket.confidence_boost();

        let consensus_books = ctx
            .other_books_closing
            .iter()
            .filter(|p| {
                matches!(
                    (p.money_minus_bet, closing.money_minus_bet),
                    (Some(a), Some(b)) if a.signum() == b.signum()
                )
            })
            .count()
            + 1;
        if consensus_books >= 3 {
            confidence *= 1.1;
        }

        if let Some(movement) = closing.line_movement_from_prev {
            let signal_favors_home = matches!(signal.side, crate::domain::Side::Home | crate::domain::Side::Over);
            let moved_toward_home = movement < 0.0;
            if signal_favors_home == moved_toward_home {
                confidence *= 1.2;
            } else {
                confidence *= 0.8;
            }
        }
    }

    confidence *= variant.edge_weight;
    confidence.clamp(0.0, 1.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{curated as curated_store, staging as staging_store};
    use crate::domain::{Daypart, Game, MarketSizeTag};

    #[test]
    fn evaluate_game_is_deterministic_across_runs() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let start = Utc::now() + chrono::Duration::hours(2);

        let game = Game {
            game_id: 0,
            home_team_canonical: "New York Yankees".into(),
            away_team_canonical: "Boston Red Sox".into(),
            game_date_eastern: start.date_naive(),
            game_start_utc: start,
            park: "Yankee Stadium".into(),
            market_size_tag: MarketSizeTag::Large,
            daypart: Daypart::Night,
            home_score: None,
            away_score: None,
            home_win: None,
            home_cover_spread: None,
            over: None,
            resolved_at: None,
        };
        let game_id = curated_store::upsert_game(&store, &game).unwrap();

        let point = staging_store::StagingPoint {
            id: None,
            game_id,
            source: "vsin".into(),
            book: "Circa".into(),
            market: Market::Moneyline,
            collected_at: start - chrono::Duration::minutes(30),
            money_pct: Some(85.0),
            bet_pct: Some(60.0),
            split_value: Some("-150".into()),
            ingestion_sequence: 0,
        };
        staging_store::insert(&store, &point).unwrap();
        crate::curated::build_series(&store, &config, game_id, Market::Moneyline, start).unwrap();

        let variants = super::super::catalog::builtin_variants();
        let first = evaluate_game(&store, &config, &variants, game_id, start).unwrap();
        let second = evaluate_game(&store, &config, &variants, game_id, start).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.sort_key(), b.sort_key());
        }
        assert!(!first.is_empty());
    }
}
