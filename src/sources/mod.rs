//! Source Adapter layer (C2, §4.1).
//!
//! Re-architected per §9 REDESIGN FLAGS: "Dynamic dispatch over string-typed
//! source names -> replace with a closed variant type plus a registry
//! indexed by that variant. Aliases... resolved at the registry boundary,
//! not deep inside detectors." [`SourceId`] is that closed variant; alias
//! resolution happens only in [`SourceId::from_alias`].

pub mod action_network;
pub mod mlb_stats;
pub mod odds_api;
pub mod sbd;
pub mod sbr;
pub mod vsin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Market, Observation};
use crate::error::Result;

/// Closed set of sportsbook-data providers this core ingests from (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceId {
    ActionNetwork,
    Vsin,
    Sbd,
    Sbr,
    MlbStats,
    OddsApi,
}

impl SourceId {
    pub fn all() -> [SourceId; 6] {
        [
            SourceId::ActionNetwork,
            SourceId::Vsin,
            SourceId::Sbd,
            SourceId::Sbr,
            SourceId::MlbStats,
            SourceId::OddsApi,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::ActionNetwork => "action_network",
            SourceId::Vsin => "vsin",
            SourceId::Sbd => "sbd",
            SourceId::Sbr => "sbr",
            SourceId::MlbStats => "mlb_stats",
            SourceId::OddsApi => "odds_api",
        }
    }

    /// Resolve a provider-facing alias to its canonical [`SourceId`]. This is
    /// the *only* place string aliases are interpreted; adapters and
    /// detectors downstream only ever see the variant.
    pub fn from_alias(alias: &str) -> Option<SourceId> {
        match alias.to_ascii_lowercase().as_str() {
            "action_network" | "actionnetwork" | "an" => Some(SourceId::ActionNetwork),
            "vsin" => Some(SourceId::Vsin),
            "sbd" | "sportsbettingdime" => Some(SourceId::Sbd),
            "sbr" | "sportsbookreview" => Some(SourceId::Sbr),
            "mlb_stats" | "mlbstats" | "mlb" => Some(SourceId::MlbStats),
            "odds_api" | "oddsapi" | "the-odds-api" => Some(SourceId::OddsApi),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A half-open collection window; adapters only return Observations whose
/// `collected_at` falls within `[start, end)`.
#[derive(Debug, Clone, Copy)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Adapter health snapshot (§4.1 `health()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub budget_remaining: u32,
}

/// Adapter identity (§4.1 `identity()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterIdentity {
    pub source: SourceId,
    pub books_supported: Vec<String>,
    pub markets_supported: Vec<Market>,
    pub cadence_seconds: u64,
}

/// The per-source contract every provider adapter implements. Adapters never
/// share mutable state (§5) — each owns its own HTTP client and sequence
/// counter.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, window: FetchWindow) -> Result<Vec<Observation>>;
    fn health(&self) -> AdapterHealth;
    fn identity(&self) -> AdapterIdentity;
}

/// Shared bookkeeping every adapter owns privately: its own ingestion
/// sequence counter and failure/success counters for [`AdapterHealth`].
/// Never shared across adapters (§5: "Adapters never share mutable state").
pub struct AdapterState {
    sequence: std::sync::atomic::AtomicI64,
    inner: parking_lot::Mutex<AdapterStateInner>,
    daily_quota: u32,
}

struct AdapterStateInner {
    last_success_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    budget_remaining: u32,
}

impl AdapterState {
    pub fn new(daily_quota: u32) -> Self {
        Self {
            sequence: std::sync::atomic::AtomicI64::new(0),
            inner: parking_lot::Mutex::new(AdapterStateInner {
                last_success_at: None,
                consecutive_failures: 0,
                budget_remaining: daily_quota,
            }),
            daily_quota,
        }
    }

    pub fn next_sequence(&self) -> i64 {
        self.sequence
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    pub fn record_success(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.last_success_at = Some(at);
        inner.consecutive_failures = 0;
        inner.budget_remaining = inner.budget_remaining.saturating_sub(1);
    }

    /// Transient failure: never blocks, just increments the counter (§4.1:
    /// "the adapter never blocks; transient errors increment
    /// consecutive_failures and return empty").
    pub fn record_failure(&self) {
        self.inner.lock().consecutive_failures += 1;
    }

    pub fn reset_budget(&self) {
        self.inner.lock().budget_remaining = self.daily_quota;
    }

    pub fn health(&self) -> AdapterHealth {
        let inner = self.inner.lock();
        AdapterHealth {
            last_success_at: inner.last_success_at,
            consecutive_failures: inner.consecutive_failures,
            budget_remaining: inner.budget_remaining,
        }
    }
}

/// Minimal `<table>` cell extractor for the providers that publish splits as
/// embedded HTML rather than JSON (§4.1: "JSON or embedded HTML table with
/// documented column layout"). Each adapter documents its own column order;
/// this just turns `<tr>...<td>x</td><td>y</td>...</tr>` into `Vec<Vec<String>>`
/// with tags stripped and whitespace trimmed. Not a general HTML parser —
/// deliberately tolerant of the malformed markup these pages tend to ship.
pub fn parse_html_rows(html: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row_fragment in html.split("<tr").skip(1) {
        let Some(row_end) = row_fragment.find("</tr>") else {
            continue;
        };
        let row_body = &row_fragment[..row_end];
        let mut cells = Vec::new();
        for cell_fragment in row_body.split("<td").skip(1) {
            let Some(cell_start) = cell_fragment.find('>') else {
                continue;
            };
            let Some(cell_end) = cell_fragment.find("</td>") else {
                continue;
            };
            let raw = &cell_fragment[cell_start + 1..cell_end];
            let text = strip_tags(raw).trim().to_string();
            cells.push(text);
        }
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
    rows
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Parse a percentage cell like `"72%"` or `"72"`, sanitizing to the
/// [0,100]-or-NULL rule.
pub fn parse_pct_cell(cell: &str) -> Option<f64> {
    let trimmed = cell.trim().trim_end_matches('%');
    trimmed.parse::<f64>().ok().filter(|v| (0.0..=100.0).contains(v))
}

/// Drop any Observation whose `collected_at >= game_start` (§4.1: pre-game
/// only) and any percentage outside `[0,100]` (already sanitized by the
/// caller via [`Observation::sanitize_pct`]); kept as a free function so
/// every adapter applies the same boundary check without duplicating it.
pub fn drop_postgame(mut observations: Vec<Observation>, game_start: DateTime<Utc>) -> Vec<Observation> {
    observations.retain(|o| o.collected_at < game_start);
    observations
}
