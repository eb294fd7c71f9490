//! Public Fade (§4.9): heavy consensus of *money* across multiple books,
//! faded — i.e. the signal favors the side the money is NOT on. Averaged
//! across books, not a single book's reading (§4.9: "avg money across ≥2
//! books ≥85%" / "avg ≥75% across ≥3 books with min ≥70%").

use std::collections::BTreeMap;

use crate::domain::{CandidateSignal, StrategyVariant};

use super::DetectorContext;

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    let Some(closing) = ctx.closing else { return Vec::new() };
    let Some(closing_money) = closing.money_pct else { return Vec::new() };

    let mut money_values: Vec<f64> = ctx.other_books_closing.iter().filter_map(|p| p.money_pct).collect();
    money_values.push(closing_money);
    let books_reporting = money_values.len();
    let avg_money = money_values.iter().sum::<f64>() / books_reporting as f64;
    let avg_extreme = avg_money.max(100.0 - avg_money);

    let (fired, confidence) = if variant.variant_name == "FADE_HEAVY" {
        let heavy_pct = variant.threshold("heavy_pct", 85.0);
        let min_books = variant.threshold("min_books", 2.0) as usize;
        (
            avg_extreme >= heavy_pct && books_reporting >= min_books,
            (avg_extreme - heavy_pct) / (100.0 - heavy_pct),
        )
    } else {
        let moderate_pct = variant.threshold("moderate_pct", 75.0);
        let min_single = variant.threshold("min_single_book_pct", 70.0);
        let required_books = variant.threshold("min_books", 3.0) as usize;
        let min_book_extreme = money_values
            .iter()
            .map(|m| m.max(100.0 - m))
            .fold(f64::INFINITY, f64::min);
        (
            avg_extreme >= moderate_pct && min_book_extreme >= min_single && books_reporting >= required_books,
            (avg_extreme - moderate_pct) / (100.0 - moderate_pct),
        )
    };

    if !fired {
        return Vec::new();
    }

    // Fade: money is heavy on home/over if avg_money > 50, so the signal favors the other side.
    let side = ctx.market.side_for_sign(avg_money <= 50.0);

    let mut features = BTreeMap::new();
    features.insert("avg_money_pct".to_string(), avg_extreme);
    features.insert("books_reporting".to_string(), books_reporting as f64);

    vec![CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: closing.collected_at,
        side,
        raw_confidence: confidence.clamp(0.0, 1.0),
        features,
        triggering_point_ids: closing.id.into_iter().collect(),
    }]
}
