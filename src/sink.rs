//! # Metric Sink
//!
//! ## Responsibility
//! Store numeric observations under named series, optionally tagged with
//! labels (e.g. `phase`), and answer aggregate queries over them.
//!
//! ## Guarantees
//! - Thread-safe: `record` may be called from any worker concurrently; each
//!   append is atomic and per-series counts are exact
//! - Append-only: observations are never mutated or removed
//! - Explicit no-data: aggregate queries return `None` for empty or
//!   non-matching series, never a default of `0`
//!
//! ## NOT Responsible For
//! - Prometheus exposition (see: `metrics`)
//! - Threshold evaluation and rendering (see: `report`)

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Label set attached to an observation. Ordered so summaries are deterministic.
pub type Labels = BTreeMap<String, String>;

/// Build a [`Labels`] map from string pairs.
///
/// ```rust
/// use tokio_prompt_loadtest::sink::labels;
/// let l = labels(&[("phase", "baseline")]);
/// assert_eq!(l.get("phase").map(String::as_str), Some("baseline"));
/// ```
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Aggregate type of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Continuous-value distribution: mean and percentiles.
    Trend,
    /// Boolean ratio: fraction of non-zero observations.
    Rate,
    /// Additive count: sum, optionally grouped by a label value.
    Counter,
}

/// A single recorded value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Time since the sink was created.
    pub at: Duration,
    /// Observed value.
    pub value: f64,
    /// Labels attached at record time.
    pub labels: Labels,
}

impl Observation {
    fn matches(&self, filter: &Labels) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|own| own == v))
    }
}

#[derive(Debug)]
struct Series {
    kind: SeriesKind,
    observations: Mutex<Vec<Observation>>,
}

/// Shared store of named, append-only series.
///
/// Series are created on first use and live for the whole run.
///
/// # Example
///
/// ```rust
/// use tokio_prompt_loadtest::sink::{labels, MetricSink};
///
/// let sink = MetricSink::new();
/// sink.add_trend("response_time", 100.0, labels(&[("phase", "baseline")]));
/// sink.add_trend("response_time", 300.0, labels(&[("phase", "stress")]));
///
/// assert_eq!(sink.mean_of("response_time", &Default::default()), Some(200.0));
/// assert_eq!(sink.mean_of("response_time", &labels(&[("phase", "baseline")])), Some(100.0));
/// assert_eq!(sink.mean_of("missing", &Default::default()), None);
/// ```
#[derive(Debug)]
pub struct MetricSink {
    started: Instant,
    series: DashMap<String, Arc<Series>>,
}

impl Default for MetricSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSink {
    /// Create an empty sink; observation timestamps are relative to now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            series: DashMap::new(),
        }
    }

    /// Record a value into `name`.
    ///
    /// If the series does not exist yet it is created as a [`SeriesKind::Trend`];
    /// otherwise the existing kind is kept.
    pub fn record(&self, name: &str, value: f64, labels: Labels) {
        self.record_as(name, SeriesKind::Trend, value, labels);
    }

    /// Record a value into a trend series.
    pub fn add_trend(&self, name: &str, value: f64, labels: Labels) {
        self.record_as(name, SeriesKind::Trend, value, labels);
    }

    /// Record a boolean outcome into a rate series (`true` counts as 1).
    pub fn add_rate(&self, name: &str, hit: bool, labels: Labels) {
        self.record_as(name, SeriesKind::Rate, if hit { 1.0 } else { 0.0 }, labels);
    }

    /// Add `value` to a counter series.
    pub fn add_counter(&self, name: &str, value: f64, labels: Labels) {
        self.record_as(name, SeriesKind::Counter, value, labels);
    }

    fn record_as(&self, name: &str, kind: SeriesKind, value: f64, labels: Labels) {
        let series = self.series_or_create(name, kind);
        if series.kind != kind {
            tracing::debug!(
                series = name,
                existing = ?series.kind,
                requested = ?kind,
                "series kind mismatch, keeping existing kind"
            );
        }
        let observation = Observation {
            at: self.started.elapsed(),
            value,
            labels,
        };
        series.observations.lock().push(observation);
    }

    fn series_or_create(&self, name: &str, kind: SeriesKind) -> Arc<Series> {
        if let Some(existing) = self.series.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self.series.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Series {
                kind,
                observations: Mutex::new(Vec::new()),
            })
        });
        Arc::clone(entry.value())
    }

    fn matching_values(&self, name: &str, filter: &Labels) -> Option<Vec<f64>> {
        let series = self.series.get(name).map(|s| Arc::clone(s.value()))?;
        let values: Vec<f64> = series
            .observations
            .lock()
            .iter()
            .filter(|o| o.matches(filter))
            .map(|o| o.value)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }

    /// Kind of the named series, if it exists.
    pub fn kind_of(&self, name: &str) -> Option<SeriesKind> {
        self.series.get(name).map(|s| s.kind)
    }

    /// Names of all series, sorted.
    pub fn series_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of observations in `name` matching `filter`.
    pub fn count(&self, name: &str, filter: &Labels) -> usize {
        self.matching_values(name, filter).map_or(0, |v| v.len())
    }

    /// Arithmetic mean of the matching observations, or `None` if there are none.
    pub fn mean_of(&self, name: &str, filter: &Labels) -> Option<f64> {
        self.matching_values(name, filter).map(|v| mean(&v))
    }

    /// Interpolated percentile `p` (0–100) of the matching observations.
    pub fn percentile_of(&self, name: &str, p: f64, filter: &Labels) -> Option<f64> {
        let mut values = self.matching_values(name, filter)?;
        values.sort_by(f64::total_cmp);
        Some(percentile(&values, p))
    }

    /// Fraction of matching observations that are non-zero.
    pub fn rate_of(&self, name: &str, filter: &Labels) -> Option<f64> {
        self.matching_values(name, filter).map(|v| {
            let hits = v.iter().filter(|x| **x != 0.0).count();
            hits as f64 / v.len() as f64
        })
    }

    /// Sum of the matching observations.
    pub fn sum_of(&self, name: &str, filter: &Labels) -> Option<f64> {
        self.matching_values(name, filter).map(|v| v.iter().sum())
    }

    /// Sum of observations in `name`, grouped by the value of `label`.
    ///
    /// Observations without the label are grouped under the empty string.
    pub fn sum_by_label(&self, name: &str, label: &str) -> BTreeMap<String, f64> {
        let mut groups = BTreeMap::new();
        let Some(series) = self.series.get(name).map(|s| Arc::clone(s.value())) else {
            return groups;
        };
        for o in series.observations.lock().iter() {
            let key = o.labels.get(label).cloned().unwrap_or_default();
            *groups.entry(key).or_insert(0.0) += o.value;
        }
        groups
    }

    /// Distinct values seen for `label` across the series, sorted.
    pub fn label_values(&self, name: &str, label: &str) -> Vec<String> {
        self.sum_by_label(name, label)
            .into_keys()
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// Copy of every observation in `name`, in append order.
    pub fn observations(&self, name: &str) -> Vec<Observation> {
        self.series
            .get(name)
            .map(|s| s.observations.lock().clone())
            .unwrap_or_default()
    }
}

/// Arithmetic mean of a non-empty slice; `NaN` for an empty one.
pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linearly interpolated percentile over sorted values.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> Labels {
        Labels::new()
    }

    #[test]
    fn test_mean_of_missing_series_is_none() {
        let sink = MetricSink::new();
        assert_eq!(sink.mean_of("response_time", &none()), None);
    }

    #[test]
    fn test_mean_of_non_matching_filter_is_none() {
        let sink = MetricSink::new();
        sink.add_trend("response_time", 10.0, labels(&[("phase", "stress")]));
        assert_eq!(
            sink.mean_of("response_time", &labels(&[("phase", "baseline")])),
            None
        );
    }

    #[test]
    fn test_mean_of_zero_values_is_some_zero() {
        let sink = MetricSink::new();
        sink.add_trend("latency", 0.0, none());
        sink.add_trend("latency", 0.0, none());
        assert_eq!(sink.mean_of("latency", &none()), Some(0.0));
    }

    #[test]
    fn test_mean_of_filters_by_label_subset() {
        let sink = MetricSink::new();
        sink.add_trend(
            "response_time",
            100.0,
            labels(&[("phase", "baseline"), ("batch", "no")]),
        );
        sink.add_trend("response_time", 120.0, labels(&[("phase", "baseline")]));
        sink.add_trend("response_time", 900.0, labels(&[("phase", "stress")]));

        assert_eq!(
            sink.mean_of("response_time", &labels(&[("phase", "baseline")])),
            Some(110.0)
        );
        assert_eq!(sink.count("response_time", &none()), 3);
    }

    #[test]
    fn test_rate_of_counts_non_zero_fraction() {
        let sink = MetricSink::new();
        sink.add_rate("error_rate", true, none());
        sink.add_rate("error_rate", false, none());
        sink.add_rate("error_rate", false, none());
        sink.add_rate("error_rate", false, none());
        assert_eq!(sink.rate_of("error_rate", &none()), Some(0.25));
        assert_eq!(sink.kind_of("error_rate"), Some(SeriesKind::Rate));
    }

    #[test]
    fn test_sum_by_label_groups_counter_values() {
        let sink = MetricSink::new();
        sink.add_counter("hourly_requests", 1.0, labels(&[("hour", "0")]));
        sink.add_counter("hourly_requests", 1.0, labels(&[("hour", "0")]));
        sink.add_counter("hourly_requests", 1.0, labels(&[("hour", "1")]));
        sink.add_counter("hourly_requests", 1.0, none());

        let groups = sink.sum_by_label("hourly_requests", "hour");
        assert_eq!(groups.get("0"), Some(&2.0));
        assert_eq!(groups.get("1"), Some(&1.0));
        assert_eq!(groups.get(""), Some(&1.0));
        assert_eq!(sink.label_values("hourly_requests", "hour"), vec!["0", "1"]);
        assert_eq!(sink.sum_of("hourly_requests", &none()), Some(4.0));
    }

    #[test]
    fn test_percentile_interpolates_between_ranks() {
        let sink = MetricSink::new();
        for v in [10.0, 20.0, 30.0, 40.0] {
            sink.add_trend("t", v, none());
        }
        assert_eq!(sink.percentile_of("t", 0.0, &none()), Some(10.0));
        assert_eq!(sink.percentile_of("t", 100.0, &none()), Some(40.0));
        assert_eq!(sink.percentile_of("t", 50.0, &none()), Some(25.0));
    }

    #[test]
    fn test_existing_kind_is_kept_on_mismatch() {
        let sink = MetricSink::new();
        sink.add_rate("mixed", true, none());
        sink.record("mixed", 5.0, none());
        assert_eq!(sink.kind_of("mixed"), Some(SeriesKind::Rate));
        assert_eq!(sink.count("mixed", &none()), 2);
    }

    #[test]
    fn test_concurrent_writers_lose_no_observations() {
        let sink = Arc::new(MetricSink::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    let tag = t.to_string();
                    for i in 0..1000 {
                        sink.add_trend("shared", f64::from(i), labels(&[("t", tag.as_str())]));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("writer thread must not panic");
        }
        assert_eq!(sink.count("shared", &none()), 8000);
        assert_eq!(sink.count("shared", &labels(&[("t", "3")])), 1000);
    }

    #[test]
    fn test_observations_are_timestamped_monotonically_per_writer() {
        let sink = MetricSink::new();
        sink.add_trend("t", 1.0, none());
        sink.add_trend("t", 2.0, none());
        let obs = sink.observations("t");
        assert_eq!(obs.len(), 2);
        assert!(obs[0].at <= obs[1].at);
    }
}
