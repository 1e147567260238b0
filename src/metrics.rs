//! Prometheus metrics for the load harness.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup **before** the executor
//! starts. The helper functions (`record_request_latency`, `inc_request`, …)
//! are no-ops if `init_metrics` was never called.
//!
//! These counters mirror what the [`MetricSink`](crate::sink::MetricSink)
//! records so that a scraper or a `--prometheus-out` file can pick them up;
//! the sink stays the source of truth for the end-of-run report.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `loadtest_requests_total` | Counter | `endpoint` |
//! | `loadtest_request_errors_total` | Counter | `endpoint`, `err_type` |
//! | `loadtest_request_duration_seconds` | Histogram | `endpoint` |
//! | `loadtest_iterations_total` | Counter | `outcome` |
//! | `loadtest_active_workers` | Gauge | `scenario` |

use crate::HarnessError;
use prometheus::{
    core::Collector, CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All Prometheus metrics for the harness, bundled together so they can be
/// stored in a single [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Requests sent per endpoint.
    pub requests_total: CounterVec,
    /// Failed requests by endpoint and error type.
    pub request_errors: CounterVec,
    /// Request latency histogram.
    pub request_duration: HistogramVec,
    /// Completed iterations by outcome ([`OUTCOME_SUCCESS`] / [`OUTCOME_FAILURE`]).
    pub iterations_total: CounterVec,
    /// Currently active virtual workers.
    pub active_workers: IntGaugeVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// `outcome` label for an iteration whose body returned `Ok`.
pub const OUTCOME_SUCCESS: &str = "success";
/// `outcome` label for an iteration whose body returned an error.
pub const OUTCOME_FAILURE: &str = "failure";

fn init_err(e: prometheus::Error) -> HarnessError {
    HarnessError::Other(format!("metrics init failed: {e}"))
}

fn register_err(e: prometheus::Error) -> HarnessError {
    HarnessError::Other(format!("metrics registration failed: {e}"))
}

// ── Initialisation ─────────────────────────────────────────────────────────

/// Initialise all Prometheus metrics and register them with a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`HarnessError::Other`] if metric construction or registry
/// registration fails (e.g., duplicate descriptor names).
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), HarnessError> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let requests_total = CounterVec::new(
        Opts::new("loadtest_requests_total", "Requests sent to the API"),
        &["endpoint"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(requests_total.clone()))
        .map_err(register_err)?;

    let request_errors = CounterVec::new(
        Opts::new(
            "loadtest_request_errors_total",
            "Failed requests by endpoint and error type",
        ),
        &["endpoint", "err_type"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(request_errors.clone()))
        .map_err(register_err)?;

    let request_duration = HistogramVec::new(
        HistogramOpts::new(
            "loadtest_request_duration_seconds",
            "End-to-end request duration per endpoint",
        )
        .buckets(vec![
            0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0,
        ]),
        &["endpoint"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(request_duration.clone()))
        .map_err(register_err)?;

    let iterations_total = CounterVec::new(
        Opts::new("loadtest_iterations_total", "Worker iterations by outcome"),
        &["outcome"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(iterations_total.clone()))
        .map_err(register_err)?;

    let active_workers = IntGaugeVec::new(
        Opts::new("loadtest_active_workers", "Currently active virtual workers"),
        &["scenario"],
    )
    .map_err(init_err)?;
    registry
        .register(Box::new(active_workers.clone()))
        .map_err(register_err)?;

    // If another thread raced us, the first one wins; both bundles carry
    // identical descriptors.
    let _ = METRICS.set(Metrics {
        registry,
        requests_total,
        request_errors,
        request_duration,
        iterations_total,
        active_workers,
    });

    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Record the end-to-end latency of one request. No-op before init.
pub fn record_request_latency(endpoint: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.request_duration.get_metric_with_label_values(&[endpoint]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Increment the request counter for an endpoint. No-op before init.
pub fn inc_request(endpoint: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.requests_total.get_metric_with_label_values(&[endpoint]) {
            c.inc();
        }
    }
}

/// Increment the error counter for an endpoint and error type. No-op before init.
pub fn inc_error(endpoint: &str, err_type: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .request_errors
            .get_metric_with_label_values(&[endpoint, err_type])
        {
            c.inc();
        }
    }
}

/// Count one finished iteration under [`OUTCOME_SUCCESS`] or [`OUTCOME_FAILURE`].
pub fn inc_iteration(outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.iterations_total.get_metric_with_label_values(&[outcome]) {
            c.inc();
        }
    }
}

/// Set the active-worker gauge for a scenario. No-op before init.
pub fn set_active_workers(scenario: &str, workers: i64) {
    if let Some(m) = metrics() {
        if let Ok(g) = m.active_workers.get_metric_with_label_values(&[scenario]) {
            g.set(workers);
        }
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// A structured snapshot of the request counters.
#[derive(Debug, Default)]
pub struct MetricsSummary {
    /// Request counts keyed by endpoint label.
    pub requests_total: HashMap<String, u64>,
    /// Error counts keyed by `"endpoint:err_type"`.
    pub request_errors: HashMap<String, u64>,
}

fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> &'a str {
    metric
        .get_label()
        .iter()
        .find(|l| l.get_name() == name)
        .map_or("unknown", |l| l.get_value())
}

/// Return a structured summary of current counter values.
///
/// Returns an empty [`MetricsSummary`] if metrics have not been initialised.
pub fn get_metrics_summary() -> MetricsSummary {
    let Some(m) = metrics() else {
        return MetricsSummary::default();
    };

    let mut summary = MetricsSummary::default();

    for family in m.requests_total.collect() {
        for metric in family.get_metric() {
            let value = metric.get_counter().get_value() as u64;
            summary
                .requests_total
                .insert(label(metric, "endpoint").to_string(), value);
        }
    }

    for family in m.request_errors.collect() {
        for metric in family.get_metric() {
            let key = format!("{}:{}", label(metric, "endpoint"), label(metric, "err_type"));
            let value = metric.get_counter().get_value() as u64;
            summary.request_errors.insert(key, value);
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_idempotent_second_call_is_noop() {
        let _ = init_metrics();
        let result = init_metrics();
        assert!(result.is_ok(), "second call must be a no-op returning Ok");
    }

    #[test]
    fn test_helpers_before_or_after_init_do_not_panic() {
        record_request_latency("chat_completion", Duration::from_millis(5));
        inc_error("chat_completion", "decode");
        set_active_workers("smoke", 1);
    }

    #[test]
    fn test_gather_metrics_contains_request_counter_after_observation() {
        let _ = init_metrics();
        inc_request("metrics-test-endpoint");
        let output = gather_metrics();
        assert!(
            output.contains("loadtest_requests_total"),
            "exposition must contain the requests counter"
        );
    }

    #[test]
    fn test_summary_exposes_error_counts_by_endpoint_and_type() {
        let _ = init_metrics();
        inc_error("summary-endpoint", "transport");
        inc_error("summary-endpoint", "transport");
        let summary = get_metrics_summary();
        let count = summary
            .request_errors
            .get("summary-endpoint:transport")
            .copied()
            .unwrap_or_default();
        assert!(count >= 2, "expected at least two errors, got {count}");
    }

    #[test]
    fn test_iteration_counter_is_labelled_by_outcome() {
        let _ = init_metrics();
        inc_iteration(OUTCOME_SUCCESS);
        inc_iteration(OUTCOME_FAILURE);
        let output = gather_metrics();
        assert!(output.contains(r#"loadtest_iterations_total{outcome="success"}"#));
        assert!(output.contains(r#"loadtest_iterations_total{outcome="failure"}"#));
        assert!(!output.contains(r#"outcome="ok""#));
    }
}
