//! Outbound Interface (C13, §6): the read/request surface external
//! collaborators (a CLI, a dashboard, the optional `serve` HTTP layer) use
//! to pull the pipeline's output without reaching into storage directly.
//! Every function here is a thin query or a call into an existing
//! component — the Outbound Interface adds no computation of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::domain::{BacktestResult, Recommendation, SharpTag};
use crate::error::Result;
use crate::sources::{AdapterHealth, SourceId};
use crate::storage::{backtest as backtest_store, signals as signals_store, staging as staging_store, Store};
use crate::strategy::catalog;

/// §6 `health()`: one row per configured source plus the pipeline-lag and
/// last-arbiter-run facts the operator needs to tell "stalled" from "quiet".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub sources: Vec<SourceHealth>,
    pub pipeline_lag_seconds: Option<i64>,
    pub arbiter_last_run_at: Option<DateTime<Utc>>,
    /// Staging quarantine counts by reject reason, for telling a stalled
    /// source apart from one that's fetching fine but failing validation.
    pub quarantine_by_reason: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: SourceId,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub budget_remaining: u32,
    pub healthy: bool,
}

/// Build a health snapshot from each adapter's last-known
/// [`AdapterHealth`] (gathered by the caller, which owns the live adapter
/// registry) plus the pipeline-lag fact computed from storage metadata.
pub fn health(
    store: &Store,
    config: &AppConfig,
    adapter_health: &[(SourceId, AdapterHealth)],
) -> Result<HealthReport> {
    let now = Utc::now();
    let sources = adapter_health
        .iter()
        .map(|(source, h)| SourceHealth {
            source: *source,
            last_success_at: h.last_success_at,
            consecutive_failures: h.consecutive_failures,
            budget_remaining: h.budget_remaining,
            healthy: h.consecutive_failures < config.defaults.circuit_breaker_failure_threshold,
        })
        .collect();

    let last_ingest_at = store
        .get_metadata("last_ingest_at")?
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc));
    let pipeline_lag_seconds = last_ingest_at.map(|t| (now - t).num_seconds());

    let arbiter_last_run_at = store
        .get_metadata("arbiter_last_run_at")?
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let quarantine_by_reason = staging_store::reject_counts_by_reason(store)?;

    Ok(HealthReport {
        sources,
        pipeline_lag_seconds,
        arbiter_last_run_at,
        quarantine_by_reason,
    })
}

/// §6 `list_recommendations(min_confidence?, window_minutes?)`: the latest
/// arbiter run's recommendations, optionally filtered by confidence and by
/// how recently the game starts.
pub fn list_recommendations(
    store: &Store,
    min_confidence: Option<f64>,
    window_minutes: Option<i64>,
) -> Result<Vec<Recommendation>> {
    let floor = min_confidence.unwrap_or(0.0);
    let recs = signals_store::latest_recommendations(store, floor, 500)?;

    let Some(minutes) = window_minutes else { return Ok(recs) };
    let now = Utc::now();
    let horizon = now + chrono::Duration::minutes(minutes);
    let mut filtered = Vec::with_capacity(recs.len());
    for rec in recs {
        if let Some(game) = crate::storage::curated::get_game(store, rec.game_id)? {
            if game.game_start_utc <= horizon {
                filtered.push(rec);
            }
        }
    }
    Ok(filtered)
}

/// One entry in `list_strategies()`: a variant plus its most recent
/// backtest result, if one has ever been run (§6, §4.10, §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy_name: String,
    pub variant_name: String,
    pub status: crate::domain::VariantStatus,
    pub edge_weight: f64,
    pub last_tuned_at: Option<DateTime<Utc>>,
    pub latest_backtest: Option<BacktestResult>,
}

/// §6 `list_strategies()`: every variant in the catalog with its latest
/// backtest result attached, for an operator to review ACTIVE/SHADOW status
/// against realized ROI.
pub fn list_strategies(store: &Store) -> Result<Vec<StrategySummary>> {
    let variants = catalog::load_all(store)?;
    let mut out = Vec::with_capacity(variants.len());
    for variant in variants {
        let latest_backtest = backtest_store::latest_for_variant(
            store,
            &variant.strategy_name,
            &variant.variant_name,
            variant.markets.first().copied().unwrap_or(crate::domain::Market::Moneyline),
        )?;
        out.push(StrategySummary {
            strategy_name: variant.strategy_name,
            variant_name: variant.variant_name,
            status: variant.status,
            edge_weight: variant.edge_weight,
            last_tuned_at: variant.last_tuned_at,
            latest_backtest,
        });
    }
    Ok(out)
}

/// §6 `run_backtest(window, variants?)`: on-demand backtest request, used
/// both by an operator probing a specific variant and by the Performance
/// Tuner's scheduled cadence (§4.11), which calls [`crate::backtest::run_backtest`]
/// directly rather than through this wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub strategy_names: Option<Vec<String>>,
}

pub fn run_backtest(store: &Store, config: &AppConfig, request: &BacktestRequest) -> Result<Vec<BacktestResult>> {
    let variants = catalog::load_all(store)?;
    let selected: Vec<_> = variants
        .into_iter()
        .filter(|v| {
            request
                .strategy_names
                .as_ref()
                .map(|names| names.contains(&v.strategy_name))
                .unwrap_or(true)
        })
        .collect();

    let mut results = Vec::with_capacity(selected.len());
    for variant in &selected {
        results.push(crate::backtest::run_backtest(
            store,
            config,
            variant,
            request.window_start,
            request.window_end,
        )?);
    }
    Ok(results)
}

/// A recommendation's `SharpTag` strength is useful display metadata that
/// doesn't live on [`Recommendation`] itself (it's a CURATED-point concept,
/// not an arbiter-output one); this helper recomputes it from the
/// contributing variants' recorded differential, for a consumer that wants
/// to show "STRONG/MODERATE/WEAK" without a second storage round trip.
pub fn dominant_sharp_tag(rec: &Recommendation) -> Option<SharpTag> {
    rec.contributing_variants
        .iter()
        .map(|c| c.raw_confidence)
        .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))))
        .map(|max_conf| SharpTag::from_differential(max_conf * 20.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_with_no_sources_reports_no_lag() {
        let store = Store::open_in_memory().unwrap();
        let config = AppConfig::default();
        let report = health(&store, &config, &[]).unwrap();
        assert!(report.sources.is_empty());
        assert!(report.pipeline_lag_seconds.is_none());
    }

    #[test]
    fn list_recommendations_defaults_to_zero_floor() {
        let store = Store::open_in_memory().unwrap();
        let recs = list_recommendations(&store, None, None).unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn list_strategies_covers_every_builtin_variant() {
        let store = Store::open_in_memory().unwrap();
        catalog::load_or_seed(&store).unwrap();
        let summaries = list_strategies(&store).unwrap();
        assert_eq!(summaries.len(), catalog::builtin_variants().len());
        assert!(summaries.iter().all(|s| s.latest_backtest.is_none()));
    }
}
