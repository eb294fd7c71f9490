//! Book Conflicts (§4.9): cross-book disagreement on sharp direction at one
//! book's closing point versus the rest of the market.

use std::collections::BTreeMap;

use statrs::statistics::Statistics;

use crate::domain::{CandidateSignal, StrategyVariant};

use super::{base_confidence_from_magnitude, DetectorContext};

pub fn detect(variant: &StrategyVariant, ctx: &DetectorContext) -> Vec<CandidateSignal> {
    let Some(closing) = ctx.closing else { return Vec::new() };
    let Some(diff) = closing.money_minus_bet else { return Vec::new() };

    let min_distinct_tags = variant.threshold("min_distinct_tags", 2.0) as usize;
    let min_stddev = variant.threshold("min_stddev", 10.0);
    let min_volume = variant.threshold("min_volume", 100.0);

    if ctx.other_books_closing.is_empty() {
        return Vec::new();
    }

    // Credibility-weighted: a book's differential counts toward the spread
    // in proportion to how much that book's numbers are trusted.
    let mut diffs: Vec<f64> = ctx
        .other_books_closing
        .iter()
        .filter_map(|p| p.money_minus_bet.map(|d| d * p.book_credibility_weight))
        .collect();
    diffs.push(diff * closing.book_credibility_weight);

    let distinct_tags: std::collections::BTreeSet<_> = ctx
        .other_books_closing
        .iter()
        .map(|p| format!("{:?}", p.sharp_tag))
        .chain(std::iter::once(format!("{:?}", closing.sharp_tag)))
        .collect();
    if distinct_tags.len() < min_distinct_tags {
        return Vec::new();
    }

    // Population stddev (divide by n, not n-1): these are all the books
    // observed for this game, not a sample of a larger population.
    let mean = diffs.clone().mean();
    let stddev = diffs.population_std_dev();
    if stddev < min_stddev {
        return Vec::new();
    }
    if closing.quality_score * 100.0 < min_volume.min(100.0) {
        return Vec::new();
    }

    // Side favored: the book whose differential deviates furthest from the
    // field mean, in the direction of its own signal.
    let weighted_diff = diff * closing.book_credibility_weight;
    let deviation = weighted_diff - mean;
    let side = ctx.market.side_for_sign(deviation >= 0.0);

    let mut features = BTreeMap::new();
    features.insert("stddev".to_string(), stddev);
    features.insert("deviation".to_string(), deviation);

    vec![CandidateSignal {
        game_id: ctx.game_id,
        market: ctx.market,
        book: ctx.book.clone(),
        source: ctx.source.clone(),
        strategy_name: variant.strategy_name.clone(),
        variant_name: variant.variant_name.clone(),
        fired_at: closing.collected_at,
        side,
        raw_confidence: base_confidence_from_magnitude(stddev, min_stddev * 3.0),
        features,
        triggering_point_ids: closing.id.into_iter().collect(),
    }]
}
