//! sharpline - MLB sharp-betting analysis daemon.
//!
//! Loads configuration, opens the store, seeds the strategy catalog, and
//! then runs forever: each configured source adapter fetches on its own
//! cadence (subject to the rate limiter, the circuit breaker, and live-game
//! protection), completed games get resolved against MLB Stats, and on a
//! shorter cadence the Detector Engine and Arbiter run over games starting
//! soon. The Performance Tuner runs on its own daily cadence.

use std::env;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Utc;
use dotenv::dotenv;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sharpline_core::config::AppConfig;
use sharpline_core::domain::Market;
use sharpline_core::outcomes;
use sharpline_core::pipeline;
use sharpline_core::ratelimit::RateLimitRegistry;
use sharpline_core::scheduler::Scheduler;
use sharpline_core::sources::action_network::ActionNetworkAdapter;
use sharpline_core::sources::mlb_stats::MlbStatsAdapter;
use sharpline_core::sources::odds_api::OddsApiAdapter;
use sharpline_core::sources::sbd::SbdAdapter;
use sharpline_core::sources::sbr::SbrAdapter;
use sharpline_core::sources::vsin::VsinAdapter;
use sharpline_core::sources::{FetchWindow, SourceAdapter, SourceId};
use sharpline_core::storage::Store;
use sharpline_core::strategy::catalog;
use sharpline_core::tuner;

/// Detector/Arbiter window: how far ahead of `now` we evaluate games for
/// recommendations on each pass.
const DETECT_WINDOW_HOURS: i64 = 36;
/// How often the detect-and-arbitrate pass runs, independent of any one
/// source's own cadence.
const DETECT_CADENCE_SECS: u64 = 300;
/// How often completed-game outcomes are polled.
const OUTCOME_CADENCE_SECS: u64 = 900;
/// Lookback window the Performance Tuner backtests against on each run.
const TUNER_LOOKBACK_DAYS: i64 = 45;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sharpline_core=info,sharpline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// One registered source: its stable identity plus the boxed adapter that
/// implements the fetch.
struct RegisteredSource {
    source: SourceId,
    adapter: Box<dyn SourceAdapter>,
    cadence_seconds: u64,
    daily_quota: u32,
    cooldown_secs: i64,
}

fn build_sources(config: &AppConfig) -> Vec<RegisteredSource> {
    let mut sources = Vec::new();

    for adapter_config in &config.adapters {
        if !adapter_config.enabled {
            continue;
        }
        let Some(source) = SourceId::from_alias(&adapter_config.source) else {
            warn!(source = adapter_config.source, "unknown source in configuration, skipping");
            continue;
        };

        let timeout_secs = config.defaults.fetch_timeout_secs;
        let quota = adapter_config.daily_quota;
        let cooldown_secs = config.defaults.circuit_breaker_cooldown_secs;

        match source {
            SourceId::ActionNetwork => sources.push(RegisteredSource {
                source,
                adapter: Box::new(ActionNetworkAdapter::new(adapter_config.api_key.clone(), quota, timeout_secs)),
                cadence_seconds: adapter_config.cadence_seconds,
                daily_quota: quota,
                cooldown_secs,
            }),
            SourceId::Vsin => {
                for market in [Market::Moneyline, Market::Spread, Market::Total] {
                    sources.push(RegisteredSource {
                        source,
                        adapter: Box::new(VsinAdapter::new(market, quota, timeout_secs)),
                        cadence_seconds: adapter_config.cadence_seconds,
                        daily_quota: quota,
                        cooldown_secs,
                    });
                }
            }
            SourceId::Sbd => sources.push(RegisteredSource {
                source,
                adapter: Box::new(SbdAdapter::new(quota, timeout_secs)),
                cadence_seconds: adapter_config.cadence_seconds,
                daily_quota: quota,
                cooldown_secs,
            }),
            SourceId::Sbr => sources.push(RegisteredSource {
                source,
                adapter: Box::new(SbrAdapter::new(quota, timeout_secs)),
                cadence_seconds: adapter_config.cadence_seconds,
                daily_quota: quota,
                cooldown_secs,
            }),
            SourceId::OddsApi => {
                let Some(api_key) = adapter_config.api_key.clone() else {
                    warn!(source = %source, "odds_api configured without an api_key, skipping");
                    continue;
                };
                sources.push(RegisteredSource {
                    source,
                    adapter: Box::new(OddsApiAdapter::new(api_key, quota, timeout_secs)),
                    cadence_seconds: adapter_config.cadence_seconds,
                    daily_quota: quota,
                    cooldown_secs,
                });
            }
            SourceId::MlbStats => sources.push(RegisteredSource {
                source,
                adapter: Box::new(MlbStatsAdapter::new(quota, timeout_secs)),
                cadence_seconds: adapter_config.cadence_seconds,
                daily_quota: quota,
                cooldown_secs,
            }),
        }
    }

    sources
}

async fn ingest_tick(
    store: &Store,
    config: &AppConfig,
    registry: &RateLimitRegistry,
    scheduler: &Scheduler,
    registered: &[RegisteredSource],
) {
    let now = Utc::now();
    for entry in registered {
        if !scheduler.due(entry.source, entry.cadence_seconds, now) {
            continue;
        }
        if !registry.may_fetch(entry.source, now) {
            continue;
        }
        scheduler.record_run(entry.source, now);

        let window = FetchWindow {
            start: now - chrono::Duration::hours(DETECT_WINDOW_HOURS),
            end: now + chrono::Duration::hours(DETECT_WINDOW_HOURS),
        };

        match pipeline::ingest_source(store, config, entry.source, entry.adapter.as_ref(), window).await {
            Ok(outcome) => {
                registry.record_success(entry.source);
                info!(
                    source = %entry.source,
                    fetched = outcome.fetched,
                    raw_inserted = outcome.raw_inserted,
                    staged = outcome.staged,
                    duplicates = outcome.duplicates,
                    rejected = outcome.rejected,
                    "ingest cycle complete"
                );
                if let Err(e) = pipeline::build_curated_for_window(store, config, window.start, window.end) {
                    error!(source = %entry.source, error = %e, "failed to rebuild curated series after ingest");
                }
            }
            Err(sharpline_core::CoreError::SourceRateLimited(_)) => {
                registry.record_rate_limited(entry.source, now, entry.cooldown_secs);
                warn!(source = %entry.source, "source rate limited, bucket zeroed with cooldown");
            }
            Err(e) => {
                registry.record_failure(entry.source, now);
                warn!(source = %entry.source, error = %e, "ingest cycle failed");
            }
        }
    }
}

/// MLB Stats has no meaningful daily quota of its own (free, unauthenticated
/// schedule endpoint); this just needs to be large enough never to throttle
/// one schedule poll per day.
const MLB_STATS_OUTCOME_POLL_QUOTA: u32 = 5_000;

async fn outcome_tick(store: &Store, config: &AppConfig) {
    let adapter = MlbStatsAdapter::new(MLB_STATS_OUTCOME_POLL_QUOTA, config.defaults.fetch_timeout_secs);
    let today = Utc::now().date_naive();
    for date in [today - chrono::Duration::days(1), today] {
        match outcomes::resolve_date(store, &config.team_roster, &adapter, date).await {
            Ok(records) => {
                if !records.is_empty() {
                    info!(date = %date, resolved = records.len(), "outcome resolution pass complete");
                }
            }
            Err(e) => warn!(date = %date, error = %e, "outcome resolution failed"),
        }
    }
}

fn detect_tick(store: &Store, config: &AppConfig) {
    let now = Utc::now();
    let window_end = now + chrono::Duration::hours(DETECT_WINDOW_HOURS);
    match pipeline::detect_and_arbitrate(store, config, now, window_end) {
        Ok(outcome) => info!(
            candidate_signals = outcome.candidate_signals,
            recommendations = outcome.recommendations,
            ambiguous_drops = outcome.ambiguous_drops,
            juice_drops = outcome.juice_drops,
            "detect-and-arbitrate pass complete"
        ),
        Err(e) => error!(error = %e, "detect-and-arbitrate pass failed"),
    }
}

fn tuner_tick(store: &Store, config: &AppConfig) {
    let now = Utc::now();
    match tuner::due(store, config, now) {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            error!(error = %e, "failed to check tuner cadence");
            return;
        }
    }
    match tuner::tune(store, config, now, chrono::Duration::days(TUNER_LOOKBACK_DAYS)) {
        Ok(outcome) => {
            for t in &outcome.transitions {
                if t.previous_status != t.new_status {
                    info!(
                        strategy = t.strategy_name,
                        variant = t.variant_name,
                        roi = t.roi,
                        from = ?t.previous_status,
                        to = ?t.new_status,
                        "performance tuner transition"
                    );
                }
            }
            if let Err(e) = tuner::record_run(store, now) {
                error!(error = %e, "failed to record tuner run");
            }
        }
        Err(e) => error!(error = %e, "performance tuner run failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let config_path = env::var("SHARPLINE_CONFIG_PATH").unwrap_or_else(|_| "sharpline.toml".to_string());
    let config = AppConfig::load_from(&config_path).context("loading configuration")?;

    let store = Store::open(&config.database_path).context("opening store")?;
    catalog::load_or_seed(&store).context("seeding strategy catalog")?;

    let registered = build_sources(&config);
    info!(sources = registered.len(), "registered source adapters");

    let registry = Arc::new(RateLimitRegistry::new());
    let now = Utc::now();
    for entry in &registered {
        registry.register(
            entry.source,
            entry.daily_quota,
            config.defaults.circuit_breaker_failure_threshold,
            config.defaults.circuit_breaker_window_secs,
            config.defaults.circuit_breaker_cooldown_secs,
            now,
        );
    }
    let scheduler = Arc::new(Scheduler::new());

    let mut ingest_interval = interval(StdDuration::from_secs(30));
    let mut outcome_interval = interval(StdDuration::from_secs(OUTCOME_CADENCE_SECS));
    let mut detect_interval = interval(StdDuration::from_secs(DETECT_CADENCE_SECS));
    let mut tuner_interval = interval(StdDuration::from_secs(300));

    info!("sharpline daemon started");
    loop {
        tokio::select! {
            _ = ingest_interval.tick() => {
                ingest_tick(&store, &config, &registry, &scheduler, &registered).await;
            }
            _ = outcome_interval.tick() => {
                outcome_tick(&store, &config).await;
            }
            _ = detect_interval.tick() => {
                detect_tick(&store, &config);
            }
            _ = tuner_interval.tick() => {
                tuner_tick(&store, &config);
            }
        }
    }
}
