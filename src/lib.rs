//! # tokio-prompt-loadtest
//!
//! Load-pattern orchestration and recovery analysis for OpenAI-compatible
//! completion and embedding APIs, over Tokio.
//!
//! ## Architecture
//!
//! ```text
//! Scenario (stages) ──► Executor ──► N(t) virtual workers ──► IterationBody
//!                                                                 │
//!                           RequestClient ◄───────────────────────┤
//!                                │                                │
//!                           MetricSink ◄── PhaseClassifier ──► StabilizationDetector
//!                                │
//!                           RunReport (series summaries, thresholds, recovery)
//! ```
//!
//! Components, leaves first: [`sink`], [`client`], [`executor`], [`scenario`],
//! [`phase`], [`recovery`]. [`scenarios`] wires them into the load patterns
//! (smoke, load, soak, spike, stress, recovery) and the workload shapes
//! (prefix caching, prefill- and decode-heavy, batch embeddings, benchmark).
//! [`report`] renders the end-of-run summary.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod client;
pub mod config;
pub mod executor;
pub mod metrics;
pub mod phase;
pub mod recovery;
pub mod report;
pub mod scenario;
pub mod scenarios;
pub mod sink;

// Re-exports for convenience
pub use client::{EndpointKind, HttpTransport, RequestClient, Response, Timings, Transport};
pub use config::{Config, LogFormat};
pub use executor::{ExecutionSummary, Executor, ExecutorOptions, IterationBody, IterationContext};
pub use phase::{Phase, PhaseClassifier};
pub use recovery::{DetectorConfig, RecoverySnapshot, SharedDetector, StabilizationDetector};
pub use scenario::{RampMode, Scenario, Stage};
pub use sink::{Labels, MetricSink, SeriesKind};

/// Initialise the global tracing subscriber.
///
/// - [`LogFormat::Json`]: structured JSON output for log aggregators
/// - [`LogFormat::Pretty`]: human-readable output for local runs
///
/// Filter level comes from `RUST_LOG` and falls back to `info`.
///
/// # Errors
///
/// Returns [`HarnessError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
pub fn init_tracing(format: LogFormat) -> Result<(), HarnessError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };

    result.map_err(|e| HarnessError::Other(format!("tracing init failed: {e}")))
}

/// Top-level harness errors.
///
/// Transport, status and decode failures surface to the iteration body, which decides
/// how long to back off. Configuration errors are fatal before any worker
/// starts.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Connection failure, DNS failure or timeout while talking to the API.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The API answered with a non-2xx status.
    #[error("unexpected status {status}: {preview}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Start of the response body.
        preview: String,
    },

    /// Malformed stage, phase or threshold definitions, or invalid config values.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

impl HarnessError {
    /// Stable, low-cardinality label for this error, used in metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Status { .. } => "status",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }
}

impl From<config::validation::ConfigError> for HarnessError {
    fn from(err: config::validation::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
