//! Performance Tuner (C11, §4.11): periodically backtests every catalog
//! variant and feeds the result back into the catalog — tightening
//! thresholds on marginal performers, demoting losers to SHADOW, and
//! disabling variants that are actively losing money. Runs on its own
//! cadence (`Defaults::tuner_cadence_secs`, default daily), driven by the
//! same [`crate::scheduler::Scheduler`] due-check every adapter uses.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::backtest;
use crate::config::AppConfig;
use crate::domain::{ConfidenceTier, StrategyVariant, VariantStatus};
use crate::error::Result;
use crate::storage::Store;
use crate::strategy::catalog;

/// ROI at or above this, with a HIGH confidence tier, leaves a variant
/// ACTIVE and unchanged (§4.11: strong, well-sampled performers are left
/// alone).
const ROI_STRONG: f64 = 0.05;
/// ROI at or below this demotes a variant straight to DISABLED.
const ROI_DISABLE: f64 = -0.05;
/// Default step a primary threshold is tightened by on a marginal result.
const DEFAULT_TIGHTEN_STEP: f64 = 2.0;

/// One variant's tuning decision, for logging/audit.
#[derive(Debug, Clone)]
pub struct TuningTransition {
    pub strategy_name: String,
    pub variant_name: String,
    pub roi: f64,
    pub confidence_tier: ConfidenceTier,
    pub previous_status: VariantStatus,
    pub new_status: VariantStatus,
    pub tightened_thresholds: Vec<(String, f64, f64)>,
}

#[derive(Debug, Default)]
pub struct TunerOutcome {
    pub transitions: Vec<TuningTransition>,
}

/// The threshold name(s) tightening nudges for each built-in strategy,
/// grounded in the keys its own detector reads via `StrategyVariant::threshold`
/// (`strategy/detectors/*.rs`). Strategies not listed here are left alone by
/// the tightening step (status transitions still apply).
fn primary_thresholds(strategy_name: &str) -> &'static [&'static str] {
    match strategy_name {
        "sharp_action" => &["min_differential"],
        "line_movement" => &["min_move_ml", "min_move_points"],
        "book_conflicts" => &["min_stddev"],
        "public_fade" => &["heavy_pct"],
        "consensus" => &["heavy_money"],
        "opposing_markets" => &["min_differential"],
        "late_sharp_flip" => &["early_min_differential"],
        "total_sweet_spots" => &["min_public_pct"],
        "underdog_ml_value" => &["min_public_pct_favorite"],
        "team_market_bias" => &["min_bias_pct"],
        "timing_patterns" => &["min_differential"],
        "signal_combinations" => &["min_markets_aligned"],
        _ => &[],
    }
}

/// `signal_combinations`' threshold counts aligned markets (max 3) so a step
/// of 2 would make it unreachable; every other threshold is a percentage or
/// points figure where 2 is a sane nudge.
fn tighten_step(strategy_name: &str) -> f64 {
    if strategy_name == "signal_combinations" {
        1.0
    } else {
        DEFAULT_TIGHTEN_STEP
    }
}

/// Run one tuning pass: backtest every catalog variant over
/// `[now - lookback, now)` and apply §4.11's status/threshold rule.
pub fn tune(
    store: &Store,
    config: &AppConfig,
    now: DateTime<Utc>,
    lookback: chrono::Duration,
) -> Result<TunerOutcome> {
    let variants = catalog::load_all(store)?;
    let window_start = now - lookback;
    let mut transitions = Vec::new();

    for variant in variants {
        if variant.markets.is_empty() {
            continue;
        }
        let market = variant.markets[0];
        let result = backtest::run_backtest(store, config, &variant, window_start, now)?;
        if !result.sample_sufficient {
            continue;
        }

        let roi = result.authoritative_roi();
        let tier = result.confidence_tier;
        let mut tuned = variant.clone();
        let previous_status = variant.status;
        let mut tightened = Vec::new();

        if roi >= ROI_STRONG && tier == ConfidenceTier::High {
            tuned.status = VariantStatus::Active;
        } else if roi > 0.0 {
            tuned.status = VariantStatus::Active;
            let step = tighten_step(&variant.strategy_name);
            for name in primary_thresholds(&variant.strategy_name) {
                if let Some(current) = tuned.thresholds.get(*name).copied() {
                    let new_value = current + step;
                    tuned.thresholds.insert((*name).to_string(), new_value);
                    tightened.push((name.to_string(), current, new_value));
                }
            }
        } else if roi <= ROI_DISABLE {
            tuned.status = VariantStatus::Disabled;
        } else if tier.at_least_medium() {
            tuned.status = VariantStatus::Shadow;
        }

        if tuned.status != previous_status || !tightened.is_empty() {
            tuned.last_tuned_at = Some(now);
            catalog::upsert(store, &tuned)?;

            info!(
                strategy = %variant.strategy_name,
                variant = %variant.variant_name,
                roi,
                ?tier,
                from = ?previous_status,
                to = ?tuned.status,
                "performance tuner transition"
            );

            transitions.push(TuningTransition {
                strategy_name: variant.strategy_name,
                variant_name: variant.variant_name,
                roi,
                confidence_tier: tier,
                previous_status,
                new_status: tuned.status,
                tightened_thresholds: tightened,
            });
        }
    }

    Ok(TunerOutcome { transitions })
}

/// Whether it's time for the tuner's own daily cadence, reusing the
/// scheduler's "never run -> due" rule with a dedicated metadata key rather
/// than a [`crate::sources::SourceId`] (the tuner isn't a data source).
pub fn due(store: &Store, config: &AppConfig, now: DateTime<Utc>) -> Result<bool> {
    let last_run: Option<DateTime<Utc>> = store
        .get_metadata("tuner_last_run_at")?
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc));
    Ok(match last_run {
        None => true,
        Some(last) => (now - last).num_seconds() >= config.defaults.tuner_cadence_secs as i64,
    })
}

pub fn record_run(store: &Store, now: DateTime<Utc>) -> Result<()> {
    store.set_metadata("tuner_last_run_at", &now.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Market;
    use std::collections::BTreeMap;

    fn variant(strategy: &str, variant_name: &str) -> StrategyVariant {
        StrategyVariant {
            strategy_name: strategy.into(),
            variant_name: variant_name.into(),
            description: String::new(),
            markets: vec![Market::Moneyline],
            thresholds: [("min_differential", 15.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
            min_sample_size: 1,
            status: VariantStatus::Active,
            last_tuned_at: None,
            edge_weight: 1.0,
        }
    }

    #[test]
    fn due_is_true_when_never_run() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        assert!(due(&store, &config, Utc::now()).unwrap());
    }

    #[test]
    fn due_respects_cadence_after_record_run() {
        let store = Store::open_in_memory().unwrap();
        let mut config = AppConfig::default();
        config.defaults.tuner_cadence_secs = 3600;
        let now = Utc::now();
        record_run(&store, now).unwrap();
        assert!(!due(&store, &config, now + chrono::Duration::minutes(30)).unwrap());
        assert!(due(&store, &config, now + chrono::Duration::hours(2)).unwrap());
    }

    #[test]
    fn insufficient_sample_variant_is_left_untouched() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let v = variant("sharp_action", "SHARP_STRONG");
        catalog::upsert(&store, &v).unwrap();

        let outcome = tune(&store, &config, Utc::now(), chrono::Duration::days(30)).unwrap();
        assert!(outcome.transitions.is_empty());
    }
}
