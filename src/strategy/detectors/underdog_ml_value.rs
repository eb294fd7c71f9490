//! Underdog ML Value (§4.9): public heavy on a modest favorite — back the
//! underdog, since modest favorites with heavy public backing are the
//! classic square-money trap.

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, Market, Side, StrategyVariant};

use super::DetectorContext;

fn home_odds(split: &str) -> Option<f64> {
    if split.starts_with('{') {
        let v: serde_json::Value = serde_json::from_str(split).ok()?;
        v.get("home").and_then(|h| h.as_f64())
    } else {
        split.parse().ok()
    }
}

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    if ctx.market != Market::Moneyline {
        return Vec::new();
    }
    let Some(closing) = ctx.closing else { return Vec::new() };
    let Some(money_pct) = closing.money_pct else { return Vec::new() };
    let Some(split) = &closing.split_value else { return Vec::new() };
    let Some(home_price) = home_odds(split) else { return Vec::new() };

    let min_public_pct_favorite = variant.threshold("min_public_pct_favorite", 65.0);
    let favorite_odds_ceiling = variant.threshold("favorite_odds_ceiling", -100.0);

    // A favorite has negative odds; "modest" means not worse (more negative)
    // than the ceiling, e.g. -100 to -159 qualifies, -200 does not.
    let (favorite_is_home, favorite_price, public_on_favorite) = if home_price < 0.0 {
        (true, home_price, money_pct)
    } else {
        (false, -home_price, 100.0 - money_pct)
    };

    if favorite_price < favorite_odds_ceiling || favorite_price >= 0.0 {
        return Vec::new();
    }
    if public_on_favorite < min_public_pct_favorite {
        return Vec::new();
    }

    let side = if favorite_is_home { Side::Away } else { Side::Home };
    let confidence = ((public_on_favorite - min_public_pct_favorite) / (100.0 - min_public_pct_favorite)).clamp(0.0, 1.0);

    let mut features = BTreeMap::new();
    features.insert("favorite_price".to_string(), favorite_price);
    features.insert("public_on_favorite".to_string(), public_on_favorite);

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
