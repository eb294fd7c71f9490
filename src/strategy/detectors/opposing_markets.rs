//! Opposing Markets (§4.9): moneyline and spread sharp signals point at
//! different teams in the same game — a contradiction worth surfacing on
//! whichever leg has the stronger differential.

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, Market, Side, StrategyVariant};

use super::{base_confidence_from_magnitude, DetectorContext};

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    if ctx.market != Market::Moneyline && ctx.market != Market::Spread {
        return Vec::new();
    }
    let Some(closing) = ctx.closing else { return Vec::new() };
    let Some(this_diff) = closing.money_minus_bet else { return Vec::new() };

    let other_market = match ctx.market {
        Market::Moneyline => Market::Spread,
        _ => Market::Moneyline,
    };
    let Some(sibling) = ctx.sibling_markets.get(&other_market) else { return Vec::new() };
    let Some(sibling_diff) = sibling.money_minus_bet else { return Vec::new() };

    let min_differential = variant.threshold("min_differential", 5.0);
    if this_diff.abs() < min_differential || sibling_diff.abs() < min_differential {
        return Vec::new();
    }
    if this_diff.signum() == sibling_diff.signum() {
        return Vec::new();
    }

    let stronger = if this_diff.abs() >= sibling_diff.abs() { this_diff } else { sibling_diff };
    let side = if stronger > 0.0 { Side::Home } else { Side::Away };

    let mut features = BTreeMap::new();
    features.insert("this_market_diff".to_string(), this_diff);
    features.insert("sibling_market_diff".to_string(), sibling_diff);

    vec![CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: closing.collected_at,
        side,
        raw_confidence: base_confidence_from_magnitude(stronger.abs(), 40.0),
        features,
        triggering_point_ids: closing.id.into_iter().collect(),
    }]
}
