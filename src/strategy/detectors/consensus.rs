//! Consensus (§4.9): money and bet percentages both heavy on the same side
//! (not a fade — agreement between sharp and public money is itself a
//! signal, distinct from Sharp Action's differential framing).

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, StrategyVariant};

use super::DetectorContext;

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    let Some(closing) = ctx.closing else { return Vec::new() };
    let (Some(money_pct), Some(bet_pct)) = (closing.money_pct, closing.bet_pct) else {
        return Vec::new();
    };

    let fired = if variant.variant_name == "CONSENSUS_HEAVY" {
        let heavy_money = variant.threshold("heavy_money", 90.0);
        let heavy_bet = variant.threshold("heavy_bet", 90.0);
        (money_pct >= heavy_money && bet_pct >= heavy_bet)
            || (money_pct <= 100.0 - heavy_money && bet_pct <= 100.0 - heavy_bet)
    } else {
        let mixed_money = variant.threshold("mixed_money", 80.0);
        let mixed_bet = variant.threshold("mixed_bet", 60.0);
        (money_pct >= mixed_money && bet_pct >= mixed_bet)
            || (money_pct <= 100.0 - mixed_money && bet_pct <= 100.0 - mixed_bet)
    };
    if !fired {
        return Vec::new();
    }

    let side = ctx.market.side_for_sign(money_pct >= 50.0);
    let confidence = ((money_pct.max(100.0 - money_pct)) / 100.0).clamp(0.0, 1.0);

    let mut features = BTreeMap::new();
    features.insert("money_pct".to_string(), money_pct);
    features.insert("bet_pct".to_string(), bet_pct);

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
