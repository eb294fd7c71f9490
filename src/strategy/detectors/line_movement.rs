//! Line Movement (§4.9): opening-to-closing price move past a threshold,
//! direction-aware per market (points for spread/total, cents for moneyline).

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, Market, Side, StrategyVariant};

use super::{base_confidence_from_magnitude, DetectorContext};

fn parse_value(s: &str, market: Market) -> Option<f64> {
    match market {
        Market::Moneyline => {
            if s.starts_with('{') {
                let v: serde_json::Value = serde_json::from_str(s).ok()?;
                v.get("home").and_then(|h| h.as_f64())
            } else {
                s.parse().ok()
            }
        }
        Market::Spread | Market::Total => s.parse().ok(),
    }
}

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    if ctx.series.len() < 2 {
        return Vec::new();
    }
    let opening = ctx.series.first().unwrap();
    let closing = ctx.series.last().unwrap();

    let (Some(open_raw), Some(close_raw)) = (&opening.split_value, &closing.split_value) else {
        return Vec::new();
    };
    let (Some(open_val), Some(close_val)) = (
        parse_value(open_raw, ctx.market),
        parse_value(close_raw, ctx.market),
    ) else {
        return Vec::new();
    };

    let move_amount = close_val - open_val;
    let threshold = match ctx.market {
        Market::Moneyline => variant.threshold("min_move_ml", 10.0),
        Market::Spread | Market::Total => variant.threshold("min_move_points", 1.0),
    };
    if move_amount.abs() < threshold {
        return Vec::new();
    }

    // A price moving toward home (odds shortening, i.e. more negative for
    // moneyline or line dropping for spread/total favoring home/under) is
    // treated as home-side movement; the sign convention matches
    // `money_minus_bet` elsewhere in the pipeline.
    let side = match ctx.market {
        Market::Moneyline => {
            if move_amount < 0.0 { Side::Home } else { Side::Away }
        }
        Market::Spread => {
            if move_amount < 0.0 { Side::Home } else { Side::Away }
        }
        Market::Total => {
            if move_amount < 0.0 { Side::Under } else { Side::Over }
        }
    };

    let mut features = BTreeMap::new();
    features.insert("move_amount".to_string(), move_amount);

    vec![CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: closing.collected_at,
        side,
        raw_confidence: base_confidence_from_magnitude(move_amount.abs(), threshold * 3.0),
        features,
        triggering_point_ids: [opening.id, closing.id].into_iter().flatten().collect(),
    }]
}
