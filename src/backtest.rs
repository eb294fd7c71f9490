//! Backtester (C10, §4.10): replays the Detector Engine over historical,
//! fully-resolved games and scores each variant's bets against actual
//! outcomes. Cross-temporal hygiene (§4.6/§8 "Outcome lookahead ban"): a
//! signal may only be graded against an outcome that resolved strictly
//! after the signal fired.

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::domain::{BacktestResult, CandidateSignal, ConfidenceTier, CuratedPoint, Market, Side, StrategyVariant};
use crate::error::Result;
use crate::storage::{backtest as backtest_store, curated as curated_store, Store};
use crate::strategy::engine;

const FIXED_ODDS_PROFIT_PER_DOLLAR: f64 = 100.0 / 110.0;

struct Bet {
    won: bool,
    roi_fixed: f64,
    roi_actual: Option<f64>,
}

/// Run one variant's backtest over `[window_start, window_end)`, against
/// every game in that window whose outcome has already resolved.
pub fn run_backtest(
    store: &Store,
    config: &AppConfig,
    variant: &StrategyVariant,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<BacktestResult> {
    let games = games_in_window(store, window_start, window_end)?;
    let mut bets_by_market: std::collections::BTreeMap<Market, Vec<Bet>> = std::collections::BTreeMap::new();

    for game in &games {
        let Some(resolved_at) = game.resolved_at else { continue };

        let single_variant = std::slice::from_ref(variant).to_vec();
        let signals = engine::evaluate_game(store, config, &single_variant, game.game_id, game.game_start_utc)?;

        for signal in signals {
            if signal.strategy_name != variant.strategy_name || signal.variant_name != variant.variant_name {
                continue;
            }
            // Lookahead ban: the outcome must resolve strictly after the signal fired.
            if resolved_at <= signal.fired_at {
                continue;
            }
            let Some(bet) = grade_signal(store, game, &signal) else { continue };
            bets_by_market.entry(signal.market).or_default().push(bet);
        }
    }

    let market = variant.markets.first().copied().unwrap_or(Market::Moneyline);
    let bets = bets_by_market.remove(&market).unwrap_or_default();

    let bets_count = bets.len() as u32;
    let wins = bets.iter().filter(|b| b.won).count() as u32;
    let win_rate = if bets_count > 0 { wins as f64 / bets_count as f64 } else { 0.0 };

    let roi_at_minus_110 = average(&bets.iter().map(|b| b.roi_fixed).collect::<Vec<_>>());
    let actual_rois: Vec<f64> = bets.iter().filter_map(|b| b.roi_actual).collect();
    let roi_using_actual_odds = if actual_rois.is_empty() { None } else { Some(average(&actual_rois)) };

    let drawdown = max_drawdown(&bets.iter().map(|b| b.roi_fixed).collect::<Vec<_>>());
    let confidence_tier = ConfidenceTier::from_sample_size(bets_count);
    let sample_sufficient = bets_count >= config.defaults.min_sample_size;

    let result = BacktestResult {
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        market,
        window_start,
        window_end,
        bets_count,
        wins,
        win_rate,
        roi_at_minus_110,
        roi_using_actual_odds,
        drawdown,
        confidence_tier,
        sample_sufficient,
    };
    backtest_store::insert(store, &result)?;
    Ok(result)
}

fn games_in_window(store: &Store, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<crate::domain::Game>> {
    curated_store::games_starting_in_window(store, start, end)
}

/// Grade one signal against its game's outcome, at the line that was current
/// when the signal fired (for spread/total) or the signal's own moneyline
/// price.
fn grade_signal(store: &Store, game: &crate::domain::Game, signal: &CandidateSignal) -> Option<Bet> {
    let (home_score, away_score) = (game.home_score?, game.away_score?);

    match signal.market {
        Market::Moneyline => {
            let home_win = game.home_win?;
            let won = match signal.side {
                Side::Home => home_win,
                Side::Away => !home_win,
                _ => return None,
            };
            let actual_price = closing_home_price(store, game.game_id, &signal.source, &signal.book)
                .map(|price| if signal.side == Side::Home { price } else { implied_away_price(price) });
            let roi_actual = actual_price.map(|price| profit_per_dollar(won, price));
            Some(Bet {
                won,
                roi_fixed: fixed_roi(won),
                roi_actual,
            })
        }
        Market::Spread => {
            let line = closing_line_value(store, game.game_id, &signal.source, &signal.book, Market::Spread)?;
            let margin = (home_score - away_score) as f64;
            let home_covers = margin + line > 0.0;
            let won = match signal.side {
                Side::Home => home_covers,
                Side::Away => !home_covers,
                _ => return None,
            };
            Some(Bet { won, roi_fixed: fixed_roi(won), roi_actual: None })
        }
        Market::Total => {
            let line = closing_line_value(store, game.game_id, &signal.source, &signal.book, Market::Total)?;
            let total = (home_score + away_score) as f64;
            let over_wins = total > line;
            let won = match signal.side {
                Side::Over => over_wins,
                Side::Under => !over_wins,
                _ => return None,
            };
            Some(Bet { won, roi_fixed: fixed_roi(won), roi_actual: None })
        }
    }
}

fn points_for(store: &Store, game_id: i64, market: Market) -> Vec<CuratedPoint> {
    curated_store::for_game(store, game_id, market).unwrap_or_default()
}

fn closing_home_price(store: &Store, game_id: i64, source: &str, book: &str) -> Option<f64> {
    points_for(store, game_id, Market::Moneyline)
        .into_iter()
        .filter(|p| p.source == source && p.book == book)
        .max_by_key(|p| p.collected_at)
        .and_then(|p| p.split_value)
        .and_then(|s| parse_home_price(&s))
}

fn closing_line_value(store: &Store, game_id: i64, source: &str, book: &str, market: Market) -> Option<f64> {
    points_for(store, game_id, market)
        .into_iter()
        .filter(|p| p.source == source && p.book == book)
        .max_by_key(|p| p.collected_at)
        .and_then(|p| p.split_value)
        .and_then(|s| s.parse::<f64>().ok())
}

fn parse_home_price(s: &str) -> Option<f64> {
    if s.starts_with('{') {
        let v: serde_json::Value = serde_json::from_str(s).ok()?;
        v.get("home").and_then(|h| h.as_f64())
    } else {
        s.parse().ok()
    }
}

fn implied_away_price(home_price: f64) -> f64 {
    -home_price
}

fn profit_per_dollar(won: bool, american_odds: f64) -> f64 {
    if !won {
        return -1.0;
    }
    if american_odds < 0.0 {
        100.0 / american_odds.abs()
    } else {
        american_odds / 100.0
    }
}

fn fixed_roi(won: bool) -> f64 {
    if won { FIXED_ODDS_PROFIT_PER_DOLLAR } else { -1.0 }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Max drawdown on the cumulative ROI curve, in the bet-graded order (the
/// same determinism invariant the engine gives us for `fired_at` order).
fn max_drawdown(rois: &[f64]) -> f64 {
    let mut cumulative = 0.0;
    let mut peak = 0.0;
    let mut worst = 0.0;
    for roi in rois {
        cumulative += roi;
        if cumulative > peak {
            peak = cumulative;
        }
        let drawdown = peak - cumulative;
        if drawdown > worst {
            worst = drawdown;
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Daypart, Game, MarketSizeTag, VariantStatus};
    use crate::storage::staging as staging_store;
    use std::collections::BTreeMap;

    #[test]
    fn insufficient_sample_is_not_marked_sufficient() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let variant = StrategyVariant {
            strategy_name: "sharp_action".into(),
            variant_name: "SHARP_STRONG".into(),
            description: String::new(),
            markets: vec![Market::Moneyline],
            thresholds: BTreeMap::new(),
            min_sample_size: 10,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 1.0,
        };
        let now = Utc::now();
        let result = run_backtest(&store, &config, &variant, now - chrono::Duration::days(30), now).unwrap();
        assert_eq!(result.bets_count, 0);
        assert!(!result.sample_sufficient);
    }

    #[test]
    fn graded_bet_respects_lookahead_ban() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let start = Utc::now() - chrono::Duration::days(2);

        let mut game = Game {
            game_id: 0,
            home_team_canonical: "New York Yankees".into(),
            away_team_canonical: "Boston Red Sox".into(),
            game_date_eastern: start.date_naive(),
            game_start_utc: start,
            park: "Yankee Stadium".into(),
            market_size_tag: MarketSizeTag::Large,
            daypart: Daypart::Night,
            home_score: Some(5),
            away_score: Some(2),
            home_win: Some(true),
            home_cover_spread: None,
            over: None,
            resolved_at: Some(start + chrono::Duration::hours(3)),
        };
        let game_id = curated_store::upsert_game(&store, &game).unwrap();
        game.game_id = game_id;

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

        let variant = StrategyVariant {
            strategy_name: "sharp_action".into(),
            variant_name: "SHARP_STRONG".into(),
            description: String::new(),
            markets: vec![Market::Moneyline],
            thresholds: [("min_differential", 15.0), ("min_volume", 0.0), ("min_books", 1.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            min_sample_size: 1,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 1.0,
        };

        let result = run_backtest(
            &store,
            &config,
            &variant,
            start - chrono::Duration::days(1),
            start + chrono::Duration::days(1),
        )
        .unwrap();
        assert_eq!(result.bets_count, 1);
        assert_eq!(result.wins, 1);
    }
}
