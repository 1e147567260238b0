//! Stabilization Detector
//!
//! Detects when, after an induced overload, latency returns to within a
//! tolerance of the pre-overload baseline.
//!
//! ## States
//! - **CollectingBaseline**: BASELINE latencies are accumulated
//! - **BaselineFrozen**: baseline mean computed from the collected samples
//! - **MeasuringRecovery**: RECOVERY latencies fill a trailing window
//! - **Stabilized**: the window mean crossed below the threshold (terminal)
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use tokio_prompt_loadtest::recovery::{DetectorConfig, DetectorState, LatencyObservation, StabilizationDetector};
//! use tokio_prompt_loadtest::Phase;
//!
//! let mut detector = StabilizationDetector::new(DetectorConfig::default()).unwrap();
//! let at = Duration::from_secs;
//! for ms in [100.0, 120.0, 110.0] {
//!     detector.observe(LatencyObservation::new(at(1), ms, Phase::Baseline));
//! }
//! for ms in [90.0, 95.0, 100.0] {
//!     detector.observe(LatencyObservation::new(at(300), ms, Phase::Recovery));
//! }
//! assert_eq!(detector.state(), DetectorState::Stabilized);
//! ```

use crate::config::validation::ConfigError;
use crate::phase::Phase;
use crate::sink::{self, MetricSink};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Detector state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    /// Accumulating BASELINE samples.
    CollectingBaseline,
    /// Baseline mean fixed; waiting for RECOVERY.
    BaselineFrozen,
    /// Filling the trailing window with RECOVERY samples.
    MeasuringRecovery,
    /// Stabilization declared. Terminal.
    Stabilized,
}

/// Detector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectorConfig {
    /// Stabilized when `recent_mean <= baseline_mean * tolerance_factor`.
    pub tolerance_factor: f64,
    /// Trailing window capacity (K).
    pub window_capacity: usize,
    /// Window entries needed before the first comparison.
    pub min_samples: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tolerance_factor: 1.2,
            window_capacity: 5,
            min_samples: 3,
        }
    }
}

impl DetectorConfig {
    /// Default window settings with a scenario-specific tolerance.
    pub fn with_tolerance(tolerance_factor: f64) -> Self {
        Self {
            tolerance_factor,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// [`ConfigError::InvalidField`] for a non-positive or non-finite
    /// tolerance, an empty window, or `min_samples` outside `1..=window_capacity`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance_factor.is_finite() || self.tolerance_factor <= 0.0 {
            return Err(ConfigError::InvalidField {
                field: "detector.tolerance_factor".into(),
                value: self.tolerance_factor.to_string(),
                reason: "must be a positive number".into(),
            });
        }
        if self.window_capacity == 0 {
            return Err(ConfigError::InvalidField {
                field: "detector.window_capacity".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.min_samples == 0 || self.min_samples > self.window_capacity {
            return Err(ConfigError::InvalidField {
                field: "detector.min_samples".into(),
                value: self.min_samples.to_string(),
                reason: format!("must be between 1 and {}", self.window_capacity),
            });
        }
        Ok(())
    }
}

/// One completed request as seen by the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyObservation {
    /// Completion time relative to run start.
    pub at: Duration,
    /// Request latency in milliseconds.
    pub latency_ms: f64,
    /// Phase the request was classified under.
    pub phase: Phase,
}

impl LatencyObservation {
    /// Convenience constructor.
    pub fn new(at: Duration, latency_ms: f64, phase: Phase) -> Self {
        Self {
            at,
            latency_ms,
            phase,
        }
    }
}

/// Mutable recovery record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryState {
    /// Furthest phase observed so far.
    pub current_phase: Phase,
    /// BASELINE latencies, in arrival order.
    pub baseline_samples: Vec<f64>,
    /// Mean of `baseline_samples` at freeze time; `None` before the freeze
    /// or when no samples were collected.
    pub baseline_mean: Option<f64>,
    /// Run-relative time RECOVERY was first observed.
    pub recovery_start: Option<Duration>,
    /// Most recent RECOVERY latencies, oldest first.
    pub trailing_window: VecDeque<f64>,
    /// Set once; never cleared.
    pub is_stabilized: bool,
    /// Time from `recovery_start` to stabilization.
    pub stabilization_elapsed: Option<Duration>,
}

impl RecoveryState {
    fn new(window_capacity: usize) -> Self {
        Self {
            current_phase: Phase::Baseline,
            baseline_samples: Vec::new(),
            baseline_mean: None,
            recovery_start: None,
            trailing_window: VecDeque::with_capacity(window_capacity),
            is_stabilized: false,
            stabilization_elapsed: None,
        }
    }
}

/// Something that happened while processing one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// The observation stream moved forward to a new phase.
    PhaseChanged {
        /// Previous phase.
        from: Phase,
        /// New phase.
        to: Phase,
        /// Time of the observation that carried the change.
        at: Duration,
    },
    /// The baseline was frozen. `mean` is `None` when no samples were collected.
    BaselineFrozen {
        /// Baseline mean in ms.
        mean: Option<f64>,
        /// Number of samples it was computed from.
        samples: usize,
    },
    /// The recovery clock started.
    RecoveryStarted {
        /// Recovery start, relative to run start.
        at: Duration,
    },
    /// Recent latency returned within tolerance of the baseline.
    Stabilized {
        /// Time since recovery start.
        elapsed: Duration,
        /// Trailing window mean in ms.
        recent_mean: f64,
        /// `baseline_mean * tolerance_factor`.
        threshold: f64,
    },
}

/// Single-owner stabilization state machine.
///
/// Phases only ever move forward: an observation classified under an earlier
/// phase than one already seen (a slow request finishing late) is ignored.
#[derive(Debug, Clone)]
pub struct StabilizationDetector {
    config: DetectorConfig,
    state: DetectorState,
    recovery: RecoveryState,
}

impl StabilizationDetector {
    /// # Errors
    ///
    /// See [`DetectorConfig::validate`].
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: DetectorState::CollectingBaseline,
            recovery: RecoveryState::new(config.window_capacity),
        })
    }

    /// Current state.
    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// The recovery record.
    pub fn recovery_state(&self) -> &RecoveryState {
        &self.recovery
    }

    /// Tuning in use.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Feed one completed request. Returns what changed, in order.
    pub fn observe(&mut self, obs: LatencyObservation) -> Vec<DetectorEvent> {
        let mut events = Vec::new();

        if obs.phase > self.recovery.current_phase {
            let from = self.recovery.current_phase;
            self.recovery.current_phase = obs.phase;
            events.push(DetectorEvent::PhaseChanged {
                from,
                to: obs.phase,
                at: obs.at,
            });

            if self.state == DetectorState::CollectingBaseline {
                let samples = &self.recovery.baseline_samples;
                let mean = (!samples.is_empty()).then(|| sink::mean(samples));
                self.recovery.baseline_mean = mean;
                self.state = DetectorState::BaselineFrozen;
                events.push(DetectorEvent::BaselineFrozen {
                    mean,
                    samples: samples.len(),
                });
            }

            if obs.phase == Phase::Recovery && self.state == DetectorState::BaselineFrozen {
                self.recovery.recovery_start = Some(obs.at);
                self.state = DetectorState::MeasuringRecovery;
                events.push(DetectorEvent::RecoveryStarted { at: obs.at });
            }
        }

        match (obs.phase, self.state) {
            (Phase::Baseline, DetectorState::CollectingBaseline) => {
                self.recovery.baseline_samples.push(obs.latency_ms);
            }
            (Phase::Recovery, DetectorState::MeasuringRecovery) => {
                if let Some(event) = self.push_recovery_sample(obs) {
                    events.push(event);
                }
            }
            _ => {}
        }

        events
    }

    fn push_recovery_sample(&mut self, obs: LatencyObservation) -> Option<DetectorEvent> {
        let window = &mut self.recovery.trailing_window;
        if window.len() == self.config.window_capacity {
            window.pop_front();
        }
        window.push_back(obs.latency_ms);

        if window.len() < self.config.min_samples {
            return None;
        }
        let baseline = self.recovery.baseline_mean?;

        let recent_mean = window.iter().sum::<f64>() / window.len() as f64;
        let threshold = baseline * self.config.tolerance_factor;
        if recent_mean > threshold {
            return None;
        }

        let elapsed = self
            .recovery
            .recovery_start
            .map_or(Duration::ZERO, |start| obs.at.saturating_sub(start));
        self.recovery.is_stabilized = true;
        self.recovery.stabilization_elapsed = Some(elapsed);
        self.state = DetectorState::Stabilized;
        Some(DetectorEvent::Stabilized {
            elapsed,
            recent_mean,
            threshold,
        })
    }

    /// Reporting view of the current state.
    pub fn snapshot(&self) -> RecoverySnapshot {
        let r = &self.recovery;
        RecoverySnapshot {
            state: self.state,
            is_stabilized: r.is_stabilized,
            stabilization_elapsed_ms: r.stabilization_elapsed.map(crate::client::millis),
            baseline_mean_ms: r.baseline_mean,
            baseline_samples: r.baseline_samples.len(),
            baseline_frozen: self.state != DetectorState::CollectingBaseline,
            tolerance_factor: self.config.tolerance_factor,
        }
    }
}

/// What a worker learns back from [`SharedDetector::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOutcome {
    /// State after the observation.
    pub state: DetectorState,
    /// Time since recovery start, for RECOVERY observations once the clock runs.
    pub since_recovery: Option<Duration>,
}

/// A [`StabilizationDetector`] shared by every worker of a run.
///
/// All transitions happen under one lock; events are logged and recorded
/// after it is released.
#[derive(Debug, Clone)]
pub struct SharedDetector {
    inner: Arc<Mutex<StabilizationDetector>>,
    sink: Arc<MetricSink>,
}

impl SharedDetector {
    /// Wrap a new detector that records `stabilization_time` into `sink`.
    ///
    /// # Errors
    ///
    /// See [`DetectorConfig::validate`].
    pub fn new(config: DetectorConfig, sink: Arc<MetricSink>) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(StabilizationDetector::new(config)?)),
            sink,
        })
    }

    /// Feed one completed request.
    pub fn observe(&self, obs: LatencyObservation) -> ObserveOutcome {
        let (events, outcome) = {
            let mut detector = self.inner.lock();
            let events = detector.observe(obs);
            let since_recovery = match obs.phase {
                Phase::Recovery => detector
                    .recovery
                    .recovery_start
                    .map(|start| obs.at.saturating_sub(start)),
                _ => None,
            };
            (
                events,
                ObserveOutcome {
                    state: detector.state,
                    since_recovery,
                },
            )
        };

        for event in events {
            self.emit(event);
        }
        outcome
    }

    fn emit(&self, event: DetectorEvent) {
        match event {
            DetectorEvent::PhaseChanged { from, to, at } => {
                info!(from = %from, to = %to, at_ms = at.as_millis() as u64, "phase transition");
            }
            DetectorEvent::BaselineFrozen {
                mean: Some(mean),
                samples,
            } => {
                info!(baseline_mean_ms = mean, samples, "baseline frozen");
            }
            DetectorEvent::BaselineFrozen { mean: None, .. } => {
                warn!("baseline frozen with no samples; stabilization cannot be declared");
            }
            DetectorEvent::RecoveryStarted { at } => {
                info!(at_ms = at.as_millis() as u64, "recovery clock started");
            }
            DetectorEvent::Stabilized {
                elapsed,
                recent_mean,
                threshold,
            } => {
                let elapsed_ms = crate::client::millis(elapsed);
                info!(
                    elapsed_ms,
                    recent_mean_ms = recent_mean,
                    threshold_ms = threshold,
                    "system stabilized"
                );
                self.sink
                    .add_trend("stabilization_time", elapsed_ms, sink::Labels::new());
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> DetectorState {
        self.inner.lock().state
    }

    /// Reporting view of the current state.
    pub fn snapshot(&self) -> RecoverySnapshot {
        self.inner.lock().snapshot()
    }
}

/// End-of-run view of the recovery record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoverySnapshot {
    /// Final state.
    pub state: DetectorState,
    /// Whether stabilization was declared.
    pub is_stabilized: bool,
    /// Recovery start to stabilization, in ms.
    pub stabilization_elapsed_ms: Option<f64>,
    /// Frozen baseline mean, in ms.
    pub baseline_mean_ms: Option<f64>,
    /// Number of baseline samples collected.
    pub baseline_samples: usize,
    /// Whether the baseline has been frozen.
    pub baseline_frozen: bool,
    /// Tolerance factor in use.
    pub tolerance_factor: f64,
}

impl RecoverySnapshot {
    /// Summarize for the report.
    pub fn verdict(&self) -> RecoveryVerdict {
        match self.stabilization_elapsed_ms {
            Some(elapsed_ms) if self.is_stabilized => RecoveryVerdict::Stabilized { elapsed_ms },
            _ if self.baseline_samples == 0 => RecoveryVerdict::InsufficientBaseline,
            _ => RecoveryVerdict::NotStabilized,
        }
    }
}

/// One-line recovery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RecoveryVerdict {
    /// Stabilized after `elapsed_ms`.
    Stabilized {
        /// Recovery start to stabilization, in ms.
        elapsed_ms: f64,
    },
    /// Recovery never came within tolerance.
    NotStabilized,
    /// No baseline samples were collected.
    InsufficientBaseline,
}

impl fmt::Display for RecoveryVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stabilized { elapsed_ms } => write!(f, "stabilized after {elapsed_ms:.0} ms"),
            Self::NotStabilized => f.write_str("did not stabilize"),
            Self::InsufficientBaseline => f.write_str("insufficient baseline data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(secs: u64, ms: f64, phase: Phase) -> LatencyObservation {
        LatencyObservation::new(Duration::from_secs(secs), ms, phase)
    }

    fn detector() -> StabilizationDetector {
        StabilizationDetector::new(DetectorConfig::default()).expect("test: valid config")
    }

    fn feed_baseline(d: &mut StabilizationDetector) {
        for ms in [100.0, 120.0, 110.0] {
            d.observe(obs(10, ms, Phase::Baseline));
        }
    }

    #[test]
    fn test_starts_collecting_baseline() {
        let d = detector();
        assert_eq!(d.state(), DetectorState::CollectingBaseline);
        assert_eq!(d.recovery_state().current_phase, Phase::Baseline);
    }

    #[test]
    fn test_stress_transition_freezes_baseline_mean() {
        let mut d = detector();
        feed_baseline(&mut d);
        let events = d.observe(obs(61, 900.0, Phase::Stress));
        assert_eq!(d.state(), DetectorState::BaselineFrozen);
        assert_eq!(d.recovery_state().baseline_mean, Some(110.0));
        assert!(events.contains(&DetectorEvent::BaselineFrozen {
            mean: Some(110.0),
            samples: 3
        }));
    }

    #[test]
    fn test_late_baseline_sample_does_not_move_frozen_mean() {
        let mut d = detector();
        feed_baseline(&mut d);
        d.observe(obs(61, 900.0, Phase::Stress));
        let events = d.observe(obs(62, 5000.0, Phase::Baseline));
        assert!(events.is_empty());
        assert_eq!(d.recovery_state().baseline_mean, Some(110.0));
        assert_eq!(d.recovery_state().current_phase, Phase::Stress);
    }

    #[test]
    fn test_recovery_transition_starts_clock() {
        let mut d = detector();
        feed_baseline(&mut d);
        d.observe(obs(61, 900.0, Phase::Stress));
        let events = d.observe(obs(241, 500.0, Phase::Recovery));
        assert_eq!(d.state(), DetectorState::MeasuringRecovery);
        assert_eq!(d.recovery_state().recovery_start, Some(Duration::from_secs(241)));
        assert!(events.contains(&DetectorEvent::RecoveryStarted {
            at: Duration::from_secs(241)
        }));
    }

    #[test]
    fn test_direct_baseline_to_recovery_freezes_and_starts_clock() {
        let mut d = detector();
        feed_baseline(&mut d);
        let events = d.observe(obs(61, 100.0, Phase::Recovery));
        assert_eq!(events.len(), 3);
        assert_eq!(d.state(), DetectorState::MeasuringRecovery);
        assert_eq!(d.recovery_state().baseline_mean, Some(110.0));
    }

    #[test]
    fn test_stabilizes_on_third_window_entry() {
        let mut d = detector();
        feed_baseline(&mut d);
        d.observe(obs(61, 900.0, Phase::Stress));
        d.observe(obs(240, 90.0, Phase::Recovery));
        d.observe(obs(241, 95.0, Phase::Recovery));
        assert_eq!(d.state(), DetectorState::MeasuringRecovery);
        let events = d.observe(obs(245, 100.0, Phase::Recovery));
        assert_eq!(d.state(), DetectorState::Stabilized);
        assert_eq!(
            d.recovery_state().stabilization_elapsed,
            Some(Duration::from_secs(5))
        );
        assert!(matches!(
            events.last(),
            Some(DetectorEvent::Stabilized { recent_mean, threshold, .. })
                if (*recent_mean - 95.0).abs() < 1e-9 && (*threshold - 132.0).abs() < 1e-9
        ));
    }

    #[test]
    fn test_slow_recovery_does_not_stabilize() {
        let mut d = detector();
        feed_baseline(&mut d);
        d.observe(obs(61, 900.0, Phase::Stress));
        for ms in [200.0, 210.0, 205.0] {
            d.observe(obs(250, ms, Phase::Recovery));
        }
        assert_eq!(d.state(), DetectorState::MeasuringRecovery);
        assert!(!d.recovery_state().is_stabilized);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut d = detector();
        feed_baseline(&mut d);
        d.observe(obs(61, 100.0, Phase::Recovery));
        // The transition observation already went into the window.
        for ms in [500.0, 500.0, 500.0, 500.0, 500.0, 500.0] {
            d.observe(obs(70, ms, Phase::Recovery));
        }
        let window: Vec<f64> = d.recovery_state().trailing_window.iter().copied().collect();
        assert_eq!(window, vec![500.0; 5]);
    }

    #[test]
    fn test_stabilization_is_one_shot() {
        let mut d = detector();
        feed_baseline(&mut d);
        for ms in [90.0, 95.0, 100.0] {
            d.observe(obs(300, ms, Phase::Recovery));
        }
        assert!(d.recovery_state().is_stabilized);
        let before = d.recovery_state().stabilization_elapsed;
        for ms in [10_000.0, 20_000.0, 30_000.0] {
            let events = d.observe(obs(400, ms, Phase::Recovery));
            assert!(events.is_empty());
        }
        assert!(d.recovery_state().is_stabilized);
        assert_eq!(d.recovery_state().stabilization_elapsed, before);
    }

    #[test]
    fn test_empty_baseline_never_stabilizes() {
        let mut d = detector();
        d.observe(obs(61, 900.0, Phase::Stress));
        assert_eq!(d.recovery_state().baseline_mean, None);
        for ms in [1.0, 1.0, 1.0, 1.0, 1.0, 1.0] {
            d.observe(obs(300, ms, Phase::Recovery));
        }
        assert_eq!(d.state(), DetectorState::MeasuringRecovery);
        assert_eq!(d.snapshot().verdict(), RecoveryVerdict::InsufficientBaseline);
        assert_eq!(d.snapshot().verdict().to_string(), "insufficient baseline data");
    }

    #[test]
    fn test_short_run_stays_in_baseline() {
        let mut d = detector();
        feed_baseline(&mut d);
        assert_eq!(d.state(), DetectorState::CollectingBaseline);
        assert_eq!(d.snapshot().verdict(), RecoveryVerdict::NotStabilized);
        assert!(!d.snapshot().baseline_frozen);
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(StabilizationDetector::new(DetectorConfig::with_tolerance(0.0)).is_err());
        assert!(StabilizationDetector::new(DetectorConfig::with_tolerance(f64::NAN)).is_err());
        let bad = DetectorConfig {
            min_samples: 6,
            ..DetectorConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_shared_detector_records_stabilization_time() {
        let sink = Arc::new(MetricSink::new());
        let shared =
            SharedDetector::new(DetectorConfig::default(), Arc::clone(&sink)).expect("test: valid");
        for ms in [100.0, 120.0, 110.0] {
            shared.observe(obs(1, ms, Phase::Baseline));
        }
        let first = shared.observe(obs(240, 90.0, Phase::Recovery));
        assert_eq!(first.since_recovery, Some(Duration::ZERO));
        shared.observe(obs(241, 95.0, Phase::Recovery));
        let last = shared.observe(obs(242, 100.0, Phase::Recovery));
        assert_eq!(last.state, DetectorState::Stabilized);
        assert_eq!(last.since_recovery, Some(Duration::from_secs(2)));
        assert_eq!(
            sink.mean_of("stabilization_time", &Default::default()),
            Some(2000.0)
        );
        assert_eq!(shared.snapshot().verdict().to_string(), "stabilized after 2000 ms");
    }

    #[test]
    fn test_shared_detector_baseline_outcome_has_no_recovery_time() {
        let sink = Arc::new(MetricSink::new());
        let shared = SharedDetector::new(DetectorConfig::default(), sink).expect("test: valid");
        let outcome = shared.observe(obs(1, 100.0, Phase::Baseline));
        assert_eq!(outcome.state, DetectorState::CollectingBaseline);
        assert_eq!(outcome.since_recovery, None);
    }
}
