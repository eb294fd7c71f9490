//! Late Sharp Flip (§4.9, §9 REDESIGN FLAGS): an early strong signal gets
//! contradicted late in the window, possibly in a different market — a sharp
//! signal is a view on the game, not just on one number, so an early strong
//! moneyline read and a late contradicting total read are the same kind of
//! flip as a same-market reversal. The canonical resolution picked in
//! REDESIGN FLAGS is to follow the early signal, not the late reversal —
//! late, low-volume moves are treated as noise or steam that doesn't hold.
//! The sign convention ("positive means sharper money on the home/over
//! side") is shared across markets, so an early diff's sign is directly
//! comparable to a late diff's sign even when they come from different
//! markets.

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, StrategyVariant, TimingBucket};

use super::{base_confidence_from_magnitude, DetectorContext};

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    let early_min_differential = variant.threshold("early_min_differential", 15.0);
    let early_hours = variant.threshold("early_hours_before", 6.0);
    let late_hours = variant.threshold("late_hours_before", 3.0);

    let early_point = ctx
        .series
        .iter()
        .filter(|p| hours_before(p) >= early_hours)
        .max_by_key(|p| p.collected_at);

    if let Some(early) = early_point {
        if let Some(early_diff) = early.money_minus_bet {
            if early_diff.abs() >= early_min_differential {
                let late_point = ctx
                    .series
                    .iter()
                    .filter(|p| hours_before(p) <= late_hours)
                    .max_by_key(|p| p.collected_at);
                if let Some(late) = late_point {
                    if let Some(late_diff) = late.money_minus_bet {
                        if late_diff.signum() != early_diff.signum() && late_diff.abs() >= 5.0 {
                            return emit(
                                variant,
                                ctx,
                                early_diff,
                                late_diff,
                                late.collected_at,
                                [early.id, late.id].into_iter().flatten().collect(),
                                false,
                            );
                        }
                    }
                }
            }
        }
    }

    // Cross-market: the early strong signal may live in a sibling market
    // instead of this one (§8 Scenario C: early moneyline, late total).
    let Some(closing) = ctx.closing else { return Vec::new() };
    if hours_before(closing) > late_hours {
        return Vec::new();
    }
    let Some(late_diff) = closing.money_minus_bet else { return Vec::new() };

    for sibling in ctx.sibling_markets.values() {
        if hours_before(sibling) < early_hours {
            continue;
        }
        let Some(sibling_diff) = sibling.money_minus_bet else { continue };
        if sibling_diff.abs() < early_min_differential {
            continue;
        }
        if sibling_diff.signum() != late_diff.signum() && late_diff.abs() >= 5.0 {
            return emit(
                variant,
                ctx,
                sibling_diff,
                late_diff,
                closing.collected_at,
                [sibling.id, closing.id].into_iter().flatten().collect(),
                true,
            );
        }
    }

    Vec::new()
}

fn emit(
    variant: &StrategyVariant,
    ctx: &DetectorContext,
    early_diff: f64,
    late_diff: f64,
    fired_at: chrono::DateTime<chrono::Utc>,
    triggering_point_ids: Vec<i64>,
    cross_market: bool,
) -> Vec<CandidateSignal> {
    let side = ctx.market.side_for_sign(early_diff > 0.0);

    let mut features = BTreeMap::new();
    features.insert("early_differential".to_string(), early_diff);
    features.insert("late_differential".to_string(), late_diff);
    features.insert("cross_market".to_string(), if cross_market { 1.0 } else { 0.0 });

    vec![CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at,
        side,
        raw_confidence: base_confidence_from_magnitude(early_diff.abs(), 40.0),
        features,
        triggering_point_ids,
    }]
}

fn hours_before(p: &crate::domain::CuratedPoint) -> f64 {
    match p.timing_bucket {
        TimingBucket::Opening => 120.0,
        TimingBucket::Early => 48.0,
        TimingBucket::SameDay => 12.0,
        TimingBucket::Late => 3.0,
        TimingBucket::Closing2h => 1.5,
        TimingBucket::ClosingHour => 0.5,
        TimingBucket::UltraLate => 0.0,
    }
}
