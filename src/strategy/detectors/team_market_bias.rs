//! Team/Market Bias (§4.9): large-market teams draw systematically heavier
//! public bet share regardless of merit. Read from the team's own history,
//! not this game's reading alone — a single heavy-bet game is noise, a
//! pattern across many is the bias this strategy is named for. Large sample
//! sizes are needed to separate that bias from true sharp signal, so this
//! variant ships SHADOW by default (§4.7: catalog seeds it disabled from
//! promotion until the Backtester and Performance Tuner have enough history
//! to judge it).

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, MarketSizeTag, StrategyVariant};

use super::DetectorContext;

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    let Some(closing) = ctx.closing else { return Vec::new() };

    if ctx.market_size != MarketSizeTag::Large {
        return Vec::new();
    }

    let min_sample_games = variant.threshold("min_sample_games", 20.0) as usize;
    if ctx.team_historical_bet_pct.len() < min_sample_games {
        return Vec::new();
    }

    let sample_size = ctx.team_historical_bet_pct.len();
    let avg_historical_bet_pct =
        ctx.team_historical_bet_pct.iter().sum::<f64>() / sample_size as f64;

    let min_bias_pct = variant.threshold("min_bias_pct", 5.0);
    let bias = avg_historical_bet_pct - 50.0;
    if bias.abs() < min_bias_pct {
        return Vec::new();
    }

    // Large-market overbet is faded.
    let side = ctx.market.side_for_sign(bias <= 0.0);
    let confidence = (bias.abs() / 50.0).clamp(0.0, 1.0) * 0.6;

    let mut features = BTreeMap::new();
    features.insert("avg_historical_bet_pct".to_string(), avg_historical_bet_pct);
    features.insert("sample_games".to_string(), sample_size as f64);

    vec![CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: closing.collected_at,
        side,
        raw_confidence: confidence,
        features,
        triggering_point_ids: closing.id.into_iter().collect(),
    }]
}
