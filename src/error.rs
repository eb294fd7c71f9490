//! Error taxonomy (§7).
//!
//! Most of these are recoverable: the adapter/pipeline/arbiter layer tallies
//! them into counters and keeps going. Only [`CoreError::Fatal`] unwinds a
//! run and surfaces through the Outbound Interface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("source rate limited: {0}")]
    SourceRateLimited(String),

    #[error("source parse error: {0}")]
    SourceParseError(String),

    #[error("source returned no data")]
    SourceEmpty,

    #[error("staging reject ({reason}): {detail}")]
    StagingReject { reason: String, detail: String },

    #[error("outcome missing for game {0}")]
    OutcomeMissing(i64),

    #[error("variant has insufficient samples: {0}")]
    VariantInsufficientSamples(String),

    #[error("ambiguous arbitration for game {game_id} market {market} book {book}")]
    AmbiguousArbitration {
        game_id: i64,
        market: String,
        book: String,
    },

    #[error("juice filter rejected recommendation: odds {odds} worse than {cutoff}")]
    JuiceFilterReject { odds: i32, cutoff: i32 },

    #[error("pipeline lag of {lag_seconds}s exceeds threshold of {threshold_seconds}s")]
    PipelineLag {
        lag_seconds: i64,
        threshold_seconds: i64,
    },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether this error is Fatal per the §7 propagation policy: only Fatal
    /// errors unwind a run, everything else is a metric.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
