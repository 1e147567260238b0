//! # Phase Classifier
//!
//! Maps elapsed run time to a named [`Phase`] using fixed boundaries.
//! The classifier holds no state; callers keep the previous phase and compare
//! with [`did_transition`].

use crate::config::validation::ConfigError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Role a measurement plays in a recovery analysis.
///
/// Ordered: `Baseline < Stress < Recovery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Normal load before any overload is induced.
    Baseline,
    /// Induced overload.
    Stress,
    /// Back to normal load; watching for stabilization.
    Recovery,
}

impl Phase {
    /// Lowercase name, used as a metric label value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Stress => "stress",
            Self::Recovery => "recovery",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `true` when the phase changed between two observations.
pub fn did_transition(previous: Phase, current: Phase) -> bool {
    previous != current
}

/// Fixed `[start, end)` intervals partitioning `[0, ∞)`.
///
/// ```rust
/// use std::time::Duration;
/// use tokio_prompt_loadtest::{Phase, PhaseClassifier};
///
/// let c = PhaseClassifier::three_phase(Duration::from_secs(60), Duration::from_secs(240)).unwrap();
/// assert_eq!(c.classify(Duration::from_secs(59)), Phase::Baseline);
/// assert_eq!(c.classify(Duration::from_secs(60)), Phase::Stress);
/// assert_eq!(c.classify(Duration::from_secs(240)), Phase::Recovery);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseClassifier {
    /// `(phase, exclusive end)` for every bounded phase.
    bounded: Vec<(Phase, Duration)>,
    /// Phase after the last boundary; extends indefinitely.
    last: Phase,
}

impl PhaseClassifier {
    /// Build from bounded `(phase, end)` segments followed by an unbounded `last`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidField`] unless ends are strictly increasing and
    /// non-zero and phases strictly move forward.
    pub fn new(bounded: Vec<(Phase, Duration)>, last: Phase) -> Result<Self, ConfigError> {
        let mut prev_end = Duration::ZERO;
        let mut prev_phase: Option<Phase> = None;
        for (i, (phase, end)) in bounded.iter().enumerate() {
            if *end <= prev_end {
                return Err(ConfigError::InvalidField {
                    field: format!("phases[{i}].end"),
                    value: format!("{end:?}"),
                    reason: "phase boundaries must be strictly increasing and non-zero".into(),
                });
            }
            if prev_phase.is_some_and(|p| p >= *phase) {
                return Err(ConfigError::InvalidField {
                    field: format!("phases[{i}]"),
                    value: phase.to_string(),
                    reason: "phases must move forward".into(),
                });
            }
            prev_end = *end;
            prev_phase = Some(*phase);
        }
        if prev_phase.is_some_and(|p| p >= last) {
            return Err(ConfigError::InvalidField {
                field: "phases.last".into(),
                value: last.to_string(),
                reason: "phases must move forward".into(),
            });
        }
        Ok(Self { bounded, last })
    }

    /// BASELINE until `baseline_end`, STRESS until `stress_end`, then RECOVERY.
    ///
    /// # Errors
    ///
    /// See [`PhaseClassifier::new`].
    pub fn three_phase(baseline_end: Duration, stress_end: Duration) -> Result<Self, ConfigError> {
        Self::new(
            vec![(Phase::Baseline, baseline_end), (Phase::Stress, stress_end)],
            Phase::Recovery,
        )
    }

    /// BASELINE until `baseline_end`, then RECOVERY; no STRESS phase.
    ///
    /// # Errors
    ///
    /// See [`PhaseClassifier::new`].
    pub fn two_phase(baseline_end: Duration) -> Result<Self, ConfigError> {
        Self::new(vec![(Phase::Baseline, baseline_end)], Phase::Recovery)
    }

    /// Phase containing `elapsed`.
    pub fn classify(&self, elapsed: Duration) -> Phase {
        self.bounded
            .iter()
            .find(|(_, end)| elapsed < *end)
            .map_or(self.last, |(phase, _)| *phase)
    }

    /// `(phase, start, end)` for every phase; `end` is `None` for the last.
    pub fn intervals(&self) -> Vec<(Phase, Duration, Option<Duration>)> {
        let mut start = Duration::ZERO;
        let mut out = Vec::with_capacity(self.bounded.len() + 1);
        for (phase, end) in &self.bounded {
            out.push((*phase, start, Some(*end)));
            start = *end;
        }
        out.push((self.last, start, None));
        out
    }
}
