//! Sharp Action (§4.9): money-vs-bet differential past a threshold, with
//! minimum sample-size adequacy. A lone book with a sufficient differential
//! fires on its own; corroborating books only raise confidence via the
//! Detector Engine's own multi-book consensus multiplier, they are never a
//! gate here.

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, Side, StrategyVariant};

use super::{base_confidence_from_magnitude, DetectorContext};

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    let Some(closing) = ctx.closing else { return Vec::new() };
    let Some(diff) = closing.money_minus_bet else { return Vec::new() };

    let min_differential = variant.threshold("min_differential", 15.0);
    let min_volume = variant.threshold("min_volume", 100.0);

    if diff.abs() < min_differential {
        return Vec::new();
    }
    if closing.money_pct.is_none() || closing.bet_pct.is_none() {
        return Vec::new();
    }
    // min_volume is a proxy threshold on quality_score * 100 since raw bet
    // counts aren't part of CuratedPoint; treat full-quality points as the
    // volume floor having been met.
    if closing.quality_score * 100.0 < min_volume.min(100.0) {
        return Vec::new();
    }

    let corroborating = ctx
        .other_books_closing
        .iter()
        .filter(|p| matches!(p.money_minus_bet, Some(d) if d.signum() == diff.signum() && d.abs() >= min_differential))
        .count()
        + 1;

    let side = ctx.market.side_for_sign(diff > 0.0);
    let raw_confidence = base_confidence_from_magnitude(diff.abs(), 50.0);

    let mut features = BTreeMap::new();
    features.insert("differential".to_string(), diff);
    features.insert("corroborating_books".to_string(), corroborating as f64);

    vec![CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: closing.collected_at,
        side,
        raw_confidence,
        features,
        triggering_point_ids: closing.id.into_iter().collect(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::detectors::test_support::point;
    use std::collections::BTreeMap as Map;

    #[test]
    fn fires_when_differential_exceeds_threshold_with_corroboration() {
        let variant = StrategyVariant {
            strategy_name: "sharp_action".into(),
            variant_name: "SHARP_STRONG".into(),
            description: String::new(),
            markets: vec![crate::domain::Market::Moneyline],
            thresholds: [("min_differential", 15.0), ("min_volume", 50.0), ("min_books", 2.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            min_sample_size: 10,
            status: crate::domain::VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 1.0,
        };
        let p = point(30, 82.0, 60.0, "-150");
        let other = point(30, 80.0, 58.0, "-145");
        let sibling: Map<crate::domain::Market, crate::domain::CuratedPoint> = Map::new();
        let others = vec![other];
        let ctx = DetectorContext {
            game_id: 1,
            market: crate::domain::Market::Moneyline,
            book: "Circa".into(),
            source: "vsin".into(),
            series: std::slice::from_ref(&p),
            closing: Some(&p),
            market_size: crate::domain::MarketSizeTag::Large,
            ballpark_factor: crate::config::BallparkFactor::Neutral,
            daypart: crate::domain::Daypart::Night,
            sibling_markets: &sibling,
            other_books_closing: &others,
            team_historical_bet_pct: &[],
        };
        let signals = detect(&variant, &ctx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Home);
    }
}
