//! Arbiter (C12, §4.12): resolves one Detector Engine run's `CandidateSignal`s
//! into at most one `Recommendation` per `(game_id, market, book)`, applying
//! the juice filter, the weighted-merge / disagreement rules, and the
//! confidence floor, in the exact five-step order §4.12 lists them.
//!
//! Single-threaded per run by design (§5: "Arbiter is single-threaded per
//! run (global merge step)") — the merge step needs every signal in a group
//! present before it can decide agreement vs. disagreement, so there is
//! nothing to parallelize here (unlike the Detector Engine, which is
//! embarrassingly parallel across variants/games).

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::{
    CandidateSignal, ContributingVariant, JuiceCheck, Market, Recommendation, Side,
    StrategyVariant, VariantStatus,
};
use crate::error::Result;
use crate::storage::{backtest as backtest_store, curated as curated_store, Store};

/// Outcome of one full Arbiter run, including the counts §7 asks every
/// recoverable-error path to tally (`AmbiguousArbitration`,
/// `JuiceFilterReject`) rather than propagate.
#[derive(Debug, Default)]
pub struct ArbiterOutcome {
    pub run_id: i64,
    pub recommendations: Vec<Recommendation>,
    pub ambiguous_drops: usize,
    pub juice_drops: usize,
}

/// Allocate the next monotonically increasing run id (§5: "Recommendations
/// from a given Detector run share a monotonically increasing run id").
pub fn next_run_id(store: &Store) -> Result<i64> {
    let current: i64 = store
        .get_metadata("arbiter_run_id")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let next = current + 1;
    store.set_metadata("arbiter_run_id", &next.to_string())?;
    Ok(next)
}

/// Run the Arbiter over one batch of CandidateSignals. `variants` must
/// contain every variant referenced by `signals` (the caller's catalog
/// snapshot) so status and edge weight can be looked up per signal.
pub fn run(
    store: &Store,
    config: &AppConfig,
    variants: &[StrategyVariant],
    signals: Vec<CandidateSignal>,
) -> Result<ArbiterOutcome> {
    let run_id = next_run_id(store)?;
    let variant_index: BTreeMap<(String, String), &StrategyVariant> = variants
        .iter()
        .map(|v| (v.key(), v))
        .collect();

    // Step 1: drop SHADOW/DISABLED signals.
    let active_signals: Vec<CandidateSignal> = signals
        .into_iter()
        .filter(|s| {
            variant_index
                .get(&(s.strategy_name.clone(), s.variant_name.clone()))
                .map(|v| v.status == VariantStatus::Active)
                .unwrap_or(false)
        })
        .collect();

    // Step 2: juice filter.
    let mut juice_drops = 0usize;
    let mut juice_passed = Vec::with_capacity(active_signals.len());
    for signal in active_signals {
        match juice_check(store, config, &signal) {
            JuiceCheck::Rejected => {
                juice_drops += 1;
                warn!(
                    game_id = signal.game_id,
                    market = %signal.market,
                    book = %signal.book,
                    side = %signal.side,
                    "JuiceFilterReject"
                );
            }
            check => juice_passed.push((signal, check)),
        }
    }

    // Step 3: group by (game_id, market, book) and merge/resolve.
    let mut groups: BTreeMap<(i64, Market, String), Vec<(CandidateSignal, JuiceCheck)>> =
        BTreeMap::new();
    for (signal, check) in juice_passed {
        let key = (signal.game_id, signal.market, signal.book.clone());
        groups.entry(key).or_default().push((signal, check));
    }

    let mut ambiguous_drops = 0usize;
    let mut recommendations = Vec::new();

    for ((game_id, market, book), members) in groups {
        match resolve_group(&variant_index, &members, config) {
            Some((side, final_confidence, contributing, juice_check)) => {
                recommendations.push(Recommendation {
                    run_id,
                    game_id,
                    market,
                    book,
                    side,
                    final_confidence,
                    contributing_variants: contributing,
                    juice_check,
                    expected_roi_estimate: expected_roi(store, market, &members),
                    rank: 0,
                });
            }
            None => {
                ambiguous_drops += 1;
                warn!(game_id, market = %market, book = %book, "AmbiguousArbitration");
            }
        }
    }

    // Step 4: rank by final confidence, descending.
    recommendations.sort_by(|a, b| {
        b.final_confidence
            .partial_cmp(&a.final_confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (i, rec) in recommendations.iter_mut().enumerate() {
        rec.rank = (i + 1) as u32;
    }

    // Step 5: confidence floor.
    recommendations.retain(|r| r.final_confidence >= config.defaults.confidence_floor);

    for rec in &recommendations {
        crate::storage::signals::insert_recommendation(store, rec)?;
    }

    info!(
        run_id,
        recommendations = recommendations.len(),
        juice_drops,
        ambiguous_drops,
        "arbiter run complete"
    );

    Ok(ArbiterOutcome {
        run_id,
        recommendations,
        ambiguous_drops,
        juice_drops,
    })
}

/// Merge or resolve one `(game, market, book)` group. Returns `None` when the
/// group is ambiguous and must be dropped (§4.12 step 3).
fn resolve_group(
    variant_index: &BTreeMap<(String, String), &StrategyVariant>,
    members: &[(CandidateSignal, JuiceCheck)],
    config: &AppConfig,
) -> Option<(Side, f64, Vec<ContributingVariant>, JuiceCheck)> {
    let sides: HashSet<Side> = members.iter().map(|(s, _)| side_key(s.side)).collect();
    let juice_check = members
        .iter()
        .map(|(_, c)| *c)
        .find(|c| *c == JuiceCheck::Rejected)
        .unwrap_or_else(|| members[0].1);

    if sides.len() == 1 {
        let side = members[0].0.side;
        let (confidence, contributing) = weighted_merge(variant_index, members.iter().map(|(s, _)| s));
        return Some((side, confidence, contributing, juice_check));
    }

    // Disagreement: sum weighted confidence per canonical side, pick the
    // greater; drop if the margin is below the configured threshold.
    let mut totals: HashMap<Side, f64> = HashMap::new();
    for (signal, _) in members {
        let weight = variant_index
            .get(&(signal.strategy_name.clone(), signal.variant_name.clone()))
            .map(|v| v.edge_weight)
            .unwrap_or(1.0);
        *totals.entry(side_key(signal.side)).or_insert(0.0) += signal.raw_confidence * weight;
    }
    let mut ranked: Vec<(Side, f64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (winner, winner_sum) = ranked[0];
    let runner_up_sum = ranked.get(1).map(|(_, v)| *v).unwrap_or(0.0);
    if winner_sum - runner_up_sum < config.defaults.ambiguity_margin {
        return None;
    }

    let winning_signals = members
        .iter()
        .map(|(s, _)| s)
        .filter(|s| side_key(s.side) == winner);
    let (confidence, contributing) = weighted_merge(variant_index, winning_signals);
    Some((winner, confidence, contributing, juice_check))
}

/// Canonicalize Side into the two-way HOME/AWAY (or OVER/UNDER) axis a group
/// disagreement is resolved on; the two are never mixed within one market so
/// no further collapsing is needed.
fn side_key(side: Side) -> Side {
    side
}

/// `final confidence = 1 - Π(1 - cᵢ·wᵢ)` (§4.12 step 3, agreement case),
/// applied to whichever subset of signals the caller passes in (the whole
/// group on agreement, the winning side only on disagreement).
fn weighted_merge<'a>(
    variant_index: &BTreeMap<(String, String), &StrategyVariant>,
    signals: impl Iterator<Item = &'a CandidateSignal>,
) -> (f64, Vec<ContributingVariant>) {
    let mut product = 1.0;
    let mut contributing = Vec::new();
    for signal in signals {
        let weight = variant_index
            .get(&(signal.strategy_name.clone(), signal.variant_name.clone()))
            .map(|v| v.edge_weight)
            .unwrap_or(1.0);
        let c = signal.raw_confidence.clamp(0.0, 1.0);
        product *= 1.0 - (c * weight).clamp(0.0, 1.0);
        contributing.push(ContributingVariant {
            strategy_name: signal.strategy_name.clone(),
            variant_name: signal.variant_name.clone(),
            weight,
            raw_confidence: signal.raw_confidence,
        });
    }
    (1.0 - product, contributing)
}

/// Expected ROI for a group's recommendation: the mean of the contributing
/// variants' latest backtested authoritative ROI (§9 policy), where one
/// exists. `None` when no contributing variant has a backtest on record yet;
/// the Arbiter ranks on `final_confidence` regardless.
fn expected_roi(store: &Store, market: Market, members: &[(CandidateSignal, JuiceCheck)]) -> Option<f64> {
    let rois: Vec<f64> = members
        .iter()
        .filter_map(|(s, _)| {
            backtest_store::latest_for_variant(store, &s.strategy_name, &s.variant_name, market)
                .ok()
                .flatten()
        })
        .map(|result| result.authoritative_roi())
        .collect();
    if rois.is_empty() {
        None
    } else {
        Some(rois.iter().sum::<f64>() / rois.len() as f64)
    }
}

/// §4.9 last bullet / §8 invariant 6: reject any moneyline recommendation
/// whose recommended side's own price is worse (more negative) than the
/// configured cutoff (default -160). Non-moneyline markets, and moneyline
/// signals where the recommended side is the underdog, are not applicable.
fn juice_check(store: &Store, config: &AppConfig, signal: &CandidateSignal) -> JuiceCheck {
    if signal.market != Market::Moneyline {
        return JuiceCheck::NotApplicable;
    }
    let Ok(points) = curated_store::closing_snapshot(store, signal.game_id, Market::Moneyline) else {
        return JuiceCheck::NotApplicable;
    };
    let Some(point) = points
        .into_iter()
        .find(|p| p.source == signal.source && p.book == signal.book)
    else {
        return JuiceCheck::NotApplicable;
    };
    let Some(split) = point.split_value else {
        return JuiceCheck::NotApplicable;
    };
    let Some(price) = side_price(&split, signal.side) else {
        return JuiceCheck::NotApplicable;
    };

    let cutoff = config.defaults.juice_cutoff as f64;
    if price < 0.0 && price < cutoff {
        JuiceCheck::Rejected
    } else {
        JuiceCheck::Passed
    }
}

fn side_price(split_json: &str, side: Side) -> Option<f64> {
    if !split_json.starts_with('{') {
        return split_json.parse::<f64>().ok().filter(|_| side == Side::Home);
    }
    let v: serde_json::Value = serde_json::from_str(split_json).ok()?;
    match side {
        Side::Home => v.get("home").and_then(|h| h.as_f64()),
        Side::Away => v.get("away").and_then(|a| a.as_f64()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn variant(name: &str, weight: f64) -> StrategyVariant {
        StrategyVariant {
            strategy_name: name.into(),
            variant_name: format!("{name}_V"),
            description: String::new(),
            markets: vec![Market::Moneyline],
            thresholds: Map::new(),
            min_sample_size: 1,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: weight,
        }
    }

    fn signal(strategy: &str, side: Side, confidence: f64, book: &str) -> CandidateSignal {
        CandidateSignal {
            game_id: 1,
            market: Market::Moneyline,
            book: book.into(),
            source: "vsin".into(),
            strategy_name: strategy.into(),
            variant_name: format!("{strategy}_V"),
            fired_at: Utc::now(),
            side,
            raw_confidence: confidence,
            features: Map::new(),
            triggering_point_ids: vec![],
        }
    }

    #[test]
    fn agreement_merges_confidence_and_emits_one_recommendation() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let variants = vec![variant("sharp_action", 1.0), variant("consensus", 1.0)];
        let signals = vec![
            signal("sharp_action", Side::Home, 0.6, "Circa"),
            signal("consensus", Side::Home, 0.5, "Circa"),
        ];
        let outcome = run(&store, &config, &variants, signals).unwrap();
        assert_eq!(outcome.recommendations.len(), 1);
        assert_eq!(outcome.recommendations[0].side, Side::Home);
        // 1 - (1-0.6)(1-0.5) = 0.8
        assert!((outcome.recommendations[0].final_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn ambiguous_disagreement_is_dropped() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let variants = vec![variant("sharp_action", 1.0), variant("consensus", 1.0)];
        let signals = vec![
            signal("sharp_action", Side::Home, 0.62, "DK"),
            signal("consensus", Side::Away, 0.58, "DK"),
        ];
        let outcome = run(&store, &config, &variants, signals).unwrap();
        assert_eq!(outcome.recommendations.len(), 0);
        assert_eq!(outcome.ambiguous_drops, 1);
    }

    #[test]
    fn dedup_invariant_one_recommendation_per_game_market_book() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let variants = vec![variant("sharp_action", 1.0)];
        let signals = vec![
            signal("sharp_action", Side::Home, 0.9, "Circa"),
            signal("sharp_action", Side::Home, 0.9, "Circa"),
        ];
        let outcome = run(&store, &config, &variants, signals).unwrap();
        assert_eq!(outcome.recommendations.len(), 1);
    }
}
