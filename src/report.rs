//! # End-of-run Report
//!
//! ## Responsibility
//! Summarize every series in the [`MetricSink`], evaluate k6-style
//! thresholds against them and render the result as text or JSON.
//!
//! ## Guarantees
//! - A threshold on a series with no data is reported as `no_data` and never
//!   fails the run
//! - The report renders regardless of how many requests failed
//!
//! ## NOT Responsible For
//! - Prometheus exposition (see: `metrics`)

use crate::config::validation::ConfigError;
use crate::executor::ExecutionSummary;
use crate::recovery::{RecoverySnapshot, RecoveryVerdict};
use crate::sink::{self, MetricSink, SeriesKind};
use crate::HarnessError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::path::Path;
use uuid::Uuid;

// ── Thresholds ───────────────────────────────────────────────────────────

/// Statistic a threshold is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Fraction of non-zero observations.
    Rate,
    /// Arithmetic mean.
    Avg,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Median.
    Med,
    /// Number of observations; the sum for counter series.
    Count,
    /// Interpolated percentile, 0–100.
    Percentile(f64),
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
        }
    }
}

/// A pass/fail criterion on one series, e.g. `p(95)<15000` on `response_time`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    /// Series the threshold applies to.
    pub series: String,
    /// Original expression.
    pub expression: String,
    /// Statistic.
    pub aggregate: Aggregate,
    /// Operator.
    pub op: Comparison,
    /// Right-hand side.
    pub bound: f64,
}

impl Threshold {
    /// Parse a k6 threshold expression for `series`.
    ///
    /// ```rust
    /// use tokio_prompt_loadtest::report::{Aggregate, Threshold};
    ///
    /// let t = Threshold::parse("response_time", "p(95)<15000").unwrap();
    /// assert_eq!(t.aggregate, Aggregate::Percentile(95.0));
    /// assert_eq!(t.bound, 15000.0);
    /// assert!(Threshold::parse("response_time", "p95 < fast").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidField`] for an unknown statistic, operator or a
    /// non-numeric bound.
    pub fn parse(series: &str, expression: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidField {
            field: format!("thresholds.{series}"),
            value: expression.to_string(),
            reason: reason.to_string(),
        };

        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        let op_at = compact
            .find(['<', '>'])
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let (lhs, rest) = compact.split_at(op_at);
        let (op, rhs) = if let Some(rhs) = rest.strip_prefix("<=") {
            (Comparison::Le, rhs)
        } else if let Some(rhs) = rest.strip_prefix(">=") {
            (Comparison::Ge, rhs)
        } else if let Some(rhs) = rest.strip_prefix('<') {
            (Comparison::Lt, rhs)
        } else if let Some(rhs) = rest.strip_prefix('>') {
            (Comparison::Gt, rhs)
        } else {
            return Err(invalid("missing comparison operator"));
        };

        let aggregate = match lhs {
            "rate" => Aggregate::Rate,
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "med" => Aggregate::Med,
            "count" => Aggregate::Count,
            other => {
                let p = other
                    .strip_prefix("p(")
                    .and_then(|s| s.strip_suffix(')'))
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|p| (0.0..=100.0).contains(p))
                    .ok_or_else(|| invalid("unknown statistic"))?;
                Aggregate::Percentile(p)
            }
        };

        let bound = rhs
            .parse::<f64>()
            .ok()
            .filter(|b| b.is_finite())
            .ok_or_else(|| invalid("bound must be a number"))?;

        Ok(Self {
            series: series.to_string(),
            expression: expression.trim().to_string(),
            aggregate,
            op,
            bound,
        })
    }

    /// Observed value of this threshold's statistic, or `None` without data.
    pub fn observe(&self, sink: &MetricSink) -> Option<f64> {
        let all = sink::Labels::new();
        let name = self.series.as_str();
        match self.aggregate {
            Aggregate::Rate => sink.rate_of(name, &all),
            Aggregate::Avg => sink.mean_of(name, &all),
            Aggregate::Min => sink.percentile_of(name, 0.0, &all),
            Aggregate::Max => sink.percentile_of(name, 100.0, &all),
            Aggregate::Med => sink.percentile_of(name, 50.0, &all),
            Aggregate::Percentile(p) => sink.percentile_of(name, p, &all),
            Aggregate::Count => match sink.kind_of(name)? {
                SeriesKind::Counter => sink.sum_of(name, &all),
                _ => Some(sink.count(name, &all) as f64).filter(|c| *c > 0.0),
            },
        }
    }

    /// Evaluate against `sink`.
    pub fn evaluate(&self, sink: &MetricSink) -> ThresholdResult {
        let observed = self.observe(sink);
        let outcome = match observed {
            None => ThresholdOutcome::NoData,
            Some(v) if self.op.holds(v, self.bound) => ThresholdOutcome::Pass,
            Some(_) => ThresholdOutcome::Fail,
        };
        ThresholdResult {
            series: self.series.clone(),
            expression: self.expression.clone(),
            observed,
            outcome,
        }
    }
}

/// Outcome of one threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOutcome {
    /// Criterion held.
    Pass,
    /// Criterion did not hold.
    Fail,
    /// The series had no observations.
    NoData,
}

impl fmt::Display for ThresholdOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::NoData => "NO DATA",
        })
    }
}

/// Evaluated threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    /// Series name.
    pub series: String,
    /// Original expression.
    pub expression: String,
    /// Observed statistic.
    pub observed: Option<f64>,
    /// Outcome.
    pub outcome: ThresholdOutcome,
}

// ── Series summaries ─────────────────────────────────────────────────────

/// Aggregates of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    /// Series name.
    pub name: String,
    /// Series kind.
    pub kind: SeriesKind,
    /// Number of observations.
    pub count: usize,
    /// Trend statistics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendStats>,
    /// Fraction of non-zero observations, for rate series.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Sum of observations, for counter series.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    /// Per-label sums for counter series: label name to value to sum.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_label: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Distribution of a trend series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendStats {
    /// Mean.
    pub avg: f64,
    /// Minimum.
    pub min: f64,
    /// Median.
    pub med: f64,
    /// Maximum.
    pub max: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl SeriesSummary {
    /// Summarize `name`; `None` if the series does not exist or is empty.
    pub fn collect(sink: &MetricSink, name: &str) -> Option<Self> {
        let kind = sink.kind_of(name)?;
        let observations = sink.observations(name);
        if observations.is_empty() {
            return None;
        }
        let mut values: Vec<f64> = observations.iter().map(|o| o.value).collect();
        let count = values.len();

        let mut summary = Self {
            name: name.to_string(),
            kind,
            count,
            trend: None,
            rate: None,
            sum: None,
            by_label: BTreeMap::new(),
        };

        match kind {
            SeriesKind::Trend => {
                values.sort_by(f64::total_cmp);
                summary.trend = Some(TrendStats {
                    avg: sink::mean(&values),
                    min: values[0],
                    med: sink::percentile(&values, 50.0),
                    max: values[count - 1],
                    p90: sink::percentile(&values, 90.0),
                    p95: sink::percentile(&values, 95.0),
                    p99: sink::percentile(&values, 99.0),
                });
            }
            SeriesKind::Rate => {
                let hits = values.iter().filter(|v| **v != 0.0).count();
                summary.rate = Some(hits as f64 / count as f64);
            }
            SeriesKind::Counter => {
                summary.sum = Some(values.iter().sum());
                let keys: BTreeSet<&String> =
                    observations.iter().flat_map(|o| o.labels.keys()).collect();
                for key in keys {
                    let groups: BTreeMap<String, f64> = sink
                        .sum_by_label(name, key)
                        .into_iter()
                        .filter(|(k, _)| !k.is_empty())
                        .collect();
                    summary.by_label.insert(key.clone(), groups);
                }
            }
        }
        Some(summary)
    }
}

// ── Report ───────────────────────────────────────────────────────────────

/// Identity of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMeta {
    /// Scenario name.
    pub scenario: String,
    /// API surface under test.
    pub target: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
}

/// Everything known at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run id.
    pub run_id: Uuid,
    /// Scenario, target and start time.
    #[serde(flatten)]
    pub meta: RunMeta,
    /// Executor totals.
    pub execution: ExecutionSummary,
    /// One entry per series, by name.
    pub series: Vec<SeriesSummary>,
    /// Detector state, when the scenario ran one.
    pub recovery: Option<RecoverySnapshot>,
    /// One-line recovery outcome.
    pub recovery_verdict: Option<RecoveryVerdict>,
    /// Evaluated thresholds, in declaration order.
    pub thresholds: Vec<ThresholdResult>,
}

impl RunReport {
    /// Assemble the report from the sink and the run's results.
    pub fn collect(
        meta: RunMeta,
        execution: ExecutionSummary,
        sink: &MetricSink,
        recovery: Option<RecoverySnapshot>,
        thresholds: &[Threshold],
    ) -> Self {
        let series = sink
            .series_names()
            .iter()
            .filter_map(|name| SeriesSummary::collect(sink, name))
            .collect();
        let recovery_verdict = recovery.as_ref().map(RecoverySnapshot::verdict);
        Self {
            run_id: Uuid::new_v4(),
            meta,
            execution,
            series,
            recovery,
            recovery_verdict,
            thresholds: thresholds.iter().map(|t| t.evaluate(sink)).collect(),
        }
    }

    /// `true` unless some threshold failed.
    pub fn passed(&self) -> bool {
        self.thresholds
            .iter()
            .all(|t| t.outcome != ThresholdOutcome::Fail)
    }

    /// Human-readable summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> fmt::Result {
        let e = &self.execution;
        writeln!(
            out,
            "run {} scenario={} target={} started={}",
            self.run_id,
            self.meta.scenario,
            self.meta.target,
            self.meta.started_at.to_rfc3339()
        )?;
        writeln!(out)?;
        line(out, "iterations", &format!("{} ({} failed)", e.iterations, e.failures))?;
        line(out, "peak workers", &e.peak_workers.to_string())?;
        line(out, "elapsed", &format!("{:.1}s", e.elapsed.as_secs_f64()))?;
        if e.aborted {
            line(out, "aborted", "yes")?;
        }
        writeln!(out)?;

        for s in &self.series {
            line(out, &s.name, &describe(s))?;
        }

        if let (Some(snapshot), Some(verdict)) = (&self.recovery, &self.recovery_verdict) {
            writeln!(out)?;
            write!(out, "recovery: {verdict}")?;
            if let Some(mean) = snapshot.baseline_mean_ms {
                write!(
                    out,
                    " (baseline {mean:.1} ms over {} samples, tolerance {})",
                    snapshot.baseline_samples, snapshot.tolerance_factor
                )?;
            }
            writeln!(out)?;
        }

        if !self.thresholds.is_empty() {
            writeln!(out)?;
            writeln!(out, "thresholds")?;
            for t in &self.thresholds {
                let observed = t.observed.map_or_else(|| "-".to_string(), fmt_num);
                writeln!(
                    out,
                    "  [{}] {} {} (observed {observed})",
                    t.outcome, t.series, t.expression
                )?;
            }
        }
        Ok(())
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Serialization errors from `serde_json`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write [`to_json`](Self::to_json) to `path`.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Other`] on serialization or I/O failure.
    pub fn write_json(&self, path: &Path) -> Result<(), HarnessError> {
        let json = self
            .to_json()
            .map_err(|e| HarnessError::Other(format!("report serialization failed: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| HarnessError::Other(format!("writing {}: {e}", path.display())))
    }
}

fn line(out: &mut String, name: &str, value: &str) -> fmt::Result {
    let dots = 28usize.saturating_sub(name.len()).max(2);
    writeln!(out, "  {name}{}: {value}", ".".repeat(dots))
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

fn describe(s: &SeriesSummary) -> String {
    match s.kind {
        SeriesKind::Trend => s.trend.map_or_else(String::new, |t| {
            format!(
                "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} count={}",
                fmt_num(t.avg),
                fmt_num(t.min),
                fmt_num(t.med),
                fmt_num(t.max),
                fmt_num(t.p90),
                fmt_num(t.p95),
                fmt_num(t.p99),
                s.count
            )
        }),
        SeriesKind::Rate => {
            let rate = s.rate.unwrap_or(0.0);
            let hits = (rate * s.count as f64).round() as u64;
            format!("{:.2}% ({hits} of {})", rate * 100.0, s.count)
        }
        SeriesKind::Counter => {
            let mut text = fmt_num(s.sum.unwrap_or(0.0));
            for (label, groups) in &s.by_label {
                let parts: Vec<String> = groups
                    .iter()
                    .map(|(value, sum)| format!("{label}={value}:{}", fmt_num(*sum)))
                    .collect();
                if !parts.is_empty() {
                    let _ = write!(text, " ({})", parts.join(", "));
                }
            }
            text
        }
    }
}
