//! Timing Patterns (§4.9): four named sub-patterns in the same timing series
//! — steam (a sharp, fast differential spike within a short window,
//! confirmed by reverse line movement), early-persistent (a strong
//! differential present from the start and held all the way to closing),
//! and late-developing (weak or absent early, strong only near closing).
//! Tried in that order; the first that matches fires.

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, Market, StrategyVariant};

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
    let min_differential = variant.threshold("min_differential", 10.0);

    if let Some(signal) = detect_steam(variant, ctx, min_differential) {
        return vec![signal];
    }
    if let Some(signal) = detect_early_persistent(variant, ctx, min_differential) {
        return vec![signal];
    }
    if let Some(signal) = detect_late_developing(variant, ctx, min_differential) {
        return vec![signal];
    }
    Vec::new()
}

fn detect_steam(variant: &StrategyVariant, ctx: &DetectorContext, min_differential: f64) -> Option<CandidateSignal> {
    let steam_window = variant.threshold("steam_window_minutes", 15.0);

    let mut steam: Option<(&crate::domain::CuratedPoint, &crate::domain::CuratedPoint)> = None;
    for window in ctx.series.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        let minutes = (b.collected_at - a.collected_at).num_seconds() as f64 / 60.0;
        if minutes > steam_window || minutes < 0.0 {
            continue;
        }
        let (Some(diff_a), Some(diff_b)) = (a.money_minus_bet, b.money_minus_bet) else { continue };
        if (diff_b - diff_a).abs() >= min_differential && diff_b.signum() == diff_a.signum() {
            steam = Some((a, b));
        }
    }
    let (before, after) = steam?;
    let diff_after = after.money_minus_bet?;

    // Reverse line movement: the majority of bet tickets sits on the side
    // opposite the one the differential (and the line) moved toward — the
    // line followed the money, not the crowd.
    let (Some(before_raw), Some(after_raw)) = (&before.split_value, &after.split_value) else {
        return None;
    };
    let (Some(before_val), Some(after_val)) = (parse_value(before_raw, ctx.market), parse_value(after_raw, ctx.market)) else {
        return None;
    };
    let move_amount = after_val - before_val;
    if move_amount == 0.0 {
        return None;
    }
    let moved_toward_sharp_side = (move_amount < 0.0) == (diff_after > 0.0);
    let bet_pct = after.bet_pct?;
    let tickets_favor_sharp_side = (bet_pct > 50.0) == (diff_after > 0.0);
    if !moved_toward_sharp_side || tickets_favor_sharp_side {
        return None;
    }

    let side = ctx.market.side_for_sign(diff_after > 0.0);

    let mut features = BTreeMap::new();
    features.insert("steam_differential".to_string(), diff_after);
    features.insert("pattern".to_string(), 1.0);

    Some(CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: after.collected_at,
        side,
        raw_confidence: base_confidence_from_magnitude(diff_after.abs(), 40.0),
        features,
        triggering_point_ids: [before.id, after.id].into_iter().flatten().collect(),
    })
}

fn detect_early_persistent(
    variant: &StrategyVariant,
    ctx: &DetectorContext,
    min_differential: f64,
) -> Option<CandidateSignal> {
    let earliest = ctx.series.first()?;
    let latest = ctx.series.last()?;
    let early_diff = earliest.money_minus_bet?;
    let late_diff = latest.money_minus_bet?;

    if early_diff.abs() < min_differential || late_diff.abs() < min_differential {
        return None;
    }
    if early_diff.signum() != late_diff.signum() {
        return None;
    }
    // Persistent: every point in between stays on the same side, not just
    // the endpoints.
    let holds = ctx
        .series
        .iter()
        .filter_map(|p| p.money_minus_bet)
        .all(|d| d.signum() == early_diff.signum() || d.abs() < min_differential / 2.0);
    if !holds {
        return None;
    }

    let side = ctx.market.side_for_sign(late_diff > 0.0);
    let avg_magnitude = (early_diff.abs() + late_diff.abs()) / 2.0;

    let mut features = BTreeMap::new();
    features.insert("early_differential".to_string(), early_diff);
    features.insert("late_differential".to_string(), late_diff);
    features.insert("pattern".to_string(), 2.0);

    Some(CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: latest.collected_at,
        side,
        raw_confidence: base_confidence_from_magnitude(avg_magnitude, 40.0),
        features,
        triggering_point_ids: [earliest.id, latest.id].into_iter().flatten().collect(),
    })
}

fn detect_late_developing(
    variant: &StrategyVariant,
    ctx: &DetectorContext,
    min_differential: f64,
) -> Option<CandidateSignal> {
    let earliest = ctx.series.first()?;
    let latest = ctx.series.last()?;
    let late_diff = latest.money_minus_bet?;
    if late_diff.abs() < min_differential {
        return None;
    }
    let early_weak = match earliest.money_minus_bet {
        Some(d) => d.abs() < min_differential / 2.0,
        None => true,
    };
    if !early_weak {
        return None;
    }

    let side = ctx.market.side_for_sign(late_diff > 0.0);

    let mut features = BTreeMap::new();
    features.insert("late_differential".to_string(), late_diff);
    features.insert("pattern".to_string(), 3.0);

    Some(CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: latest.collected_at,
        side,
        raw_confidence: base_confidence_from_magnitude(late_diff.abs(), 40.0),
        features,
        triggering_point_ids: [earliest.id, latest.id].into_iter().flatten().collect(),
    })
}
