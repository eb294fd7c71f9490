//! Signal Combinations (§4.9): three sub-cases built on the same cross-market
//! comparison — multi-market consensus (siblings agree, confidence compounds),
//! triple alignment (all three markets agree, the strongest form of
//! consensus), and fade-conflict (siblings actively disagree, which is
//! itself a distinct, weaker signal worth surfacing rather than discarding).

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, StrategyVariant};

use super::{base_confidence_from_magnitude, DetectorContext};

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    let Some(closing) = ctx.closing else { return Vec::new() };
    let Some(this_diff) = closing.money_minus_bet else { return Vec::new() };

    let min_markets_aligned = variant.threshold("min_markets_aligned", 2.0) as usize;
    let min_markets_conflicting = variant.threshold("min_markets_conflicting", 1.0) as usize;

    let mut aligned = 1;
    let mut total_magnitude = this_diff.abs();
    let mut conflicting = 0;
    for sibling in ctx.sibling_markets.values() {
        if let Some(sibling_diff) = sibling.money_minus_bet {
            if sibling_diff.abs() < 5.0 {
                continue;
            }
            if sibling_diff.signum() == this_diff.signum() {
                aligned += 1;
                total_magnitude += sibling_diff.abs();
            } else {
                conflicting += 1;
            }
        }
    }

    if aligned >= min_markets_aligned {
        let side = ctx.market.side_for_sign(this_diff > 0.0);
        let avg_magnitude = total_magnitude / aligned as f64;

        let mut features = BTreeMap::new();
        features.insert("markets_aligned".to_string(), aligned as f64);
        features.insert("average_differential".to_string(), avg_magnitude);

        return vec![CandidateSignal {
            game_id: ctx.game_id,
            market: ctx.market,
            book: ctx.book.clone(),
            source: ctx.source.clone(),
            strategy_name: variant.strategy_name.clone(),
            variant_name: variant.variant_name.clone(),
            fired_at: closing.collected_at,
            side,
            raw_confidence: base_confidence_from_magnitude(avg_magnitude, 40.0),
            features,
            triggering_point_ids: closing.id.into_iter().collect(),
        }];
    }

    // Fade-conflict: siblings disagree with this market rather than confirm
    // it. Still surfaced, but on this market's own signal only, and at
    // reduced confidence since the cross-market picture is split rather
    // than corroborating.
    if conflicting >= min_markets_conflicting {
        let side = ctx.market.side_for_sign(this_diff > 0.0);

        let mut features = BTreeMap::new();
        features.insert("markets_conflicting".to_string(), conflicting as f64);
        features.insert("this_differential".to_string(), this_diff);

        return vec![CandidateSignal {
            game_id: ctx.game_id,
            market: ctx.market,
            book: ctx.book.clone(),
            source: ctx.source.clone(),
            strategy_name: variant.strategy_name.clone(),
            variant_name: variant.variant_name.clone(),
            fired_at: closing.collected_at,
            side,
            raw_confidence: base_confidence_from_magnitude(this_diff.abs(), 40.0) * 0.5,
            features,
            triggering_point_ids: closing.id.into_iter().collect(),
        }];
    }

    Vec::new()
}
