//! Total Sweet Spots (§4.9): public bias at the "key" total numbers
//! {7.5, 8.5, 9.5}, scaled by ballpark factor, but only when sharp money
//! sits on the side opposite the public lean — a key number with the
//! public and the money on the same side isn't a sweet spot, it's just
//! a popular bet.

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, Market, Side, StrategyVariant};

use super::DetectorContext;

const KEY_TOTALS: [f64; 3] = [7.5, 8.5, 9.5];

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    if ctx.market != Market::Total {
        return Vec::new();
    }
    let Some(closing) = ctx.closing else { return Vec::new() };
    let Some(bet_pct) = closing.bet_pct else { return Vec::new() };
    let Some(split) = &closing.split_value else { return Vec::new() };
    let Ok(total_line) = split.parse::<f64>() else { return Vec::new() };

    if !KEY_TOTALS.iter().any(|k| (k - total_line).abs() < 0.01) {
        return Vec::new();
    }

    let min_public_pct = variant.threshold("min_public_pct", 65.0);
    let extreme = bet_pct.max(100.0 - bet_pct);
    if extreme < min_public_pct {
        return Vec::new();
    }

    // Sharp money must sit on the side opposite the public lean.
    let Some(diff) = closing.money_minus_bet else { return Vec::new() };
    let public_on_over = bet_pct > 50.0;
    let sharp_opposes_public = if public_on_over { diff < 0.0 } else { diff > 0.0 };
    if !sharp_opposes_public {
        return Vec::new();
    }

    // Fade the public at a key number: heavy public on the over implies
    // value on the under, and vice versa.
    let side = if public_on_over { Side::Under } else { Side::Over };
    let base = (extreme - min_public_pct) / (100.0 - min_public_pct);
    let confidence = (base * ctx.ballpark_factor.confidence_multiplier()).clamp(0.0, 1.0);

    let mut features = BTreeMap::new();
    features.insert("total_line".to_string(), total_line);
    features.insert("public_pct".to_string(), extreme);

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
