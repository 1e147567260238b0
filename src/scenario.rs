//! # Scenario Scheduler
//!
//! ## Responsibility
//! Hold an ordered list of [`Stage`]s and answer, for any elapsed time since
//! the run started, which stage is active and how many workers should be
//! running.
//!
//! ## Guarantees
//! - Contiguous: stage `i` starts where stage `i - 1` ends
//! - Total: every `elapsed` maps to a stage; past the end the answer is a
//!   terminal zero-concurrency stage
//! - Immutable: a built [`Scenario`] never changes
//!
//! ## NOT Responsible For
//! - Starting or stopping workers (see: `executor`)
//! - Naming phases of the run (see: `phase`)

use crate::config::validation::ConfigError;
use serde::Serialize;
use std::time::Duration;

/// A time-bounded target concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// Workers to run by the end of this stage.
    pub target_concurrency: u32,
    /// How long the stage lasts.
    pub duration: Duration,
    /// Sum of the durations of all earlier stages.
    pub start_offset: Duration,
}

impl Stage {
    /// Exclusive end of this stage relative to run start.
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.duration
    }

    /// `true` if `elapsed` falls in `[start_offset, end_offset)`.
    pub fn contains(&self, elapsed: Duration) -> bool {
        self.start_offset <= elapsed && elapsed < self.end_offset()
    }
}

/// How the target moves between stage boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampMode {
    /// The target is constant within a stage and jumps at its start.
    #[default]
    Jump,
    /// The target moves linearly from the previous stage's target to this
    /// stage's target over this stage's duration.
    Linear,
}

/// An ordered, contiguous sequence of stages.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokio_prompt_loadtest::{RampMode, Scenario};
///
/// let scenario = Scenario::builder("ramp")
///     .stage(Duration::from_secs(10), 10)
///     .stage(Duration::from_secs(10), 10)
///     .ramp(RampMode::Linear)
///     .build()
///     .unwrap();
///
/// assert_eq!(scenario.target_concurrency(Duration::from_secs(5)), 5);
/// assert_eq!(scenario.target_concurrency(Duration::from_secs(15)), 10);
/// assert_eq!(scenario.target_concurrency(Duration::from_secs(25)), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    name: String,
    stages: Vec<Stage>,
    ramp: RampMode,
    initial_target: u32,
    ramp_from: Vec<u32>,
    total: Duration,
}

impl Scenario {
    /// Start building a scenario called `name`.
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder {
            name: name.into(),
            stages: Vec::new(),
            ramp: RampMode::default(),
            initial_target: 0,
            pending_from: None,
        }
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All stages in order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Ramp mode.
    pub fn ramp_mode(&self) -> RampMode {
        self.ramp
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// `true` once `elapsed` is at or past the end of the last stage.
    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.total
    }

    fn index_at(&self, elapsed: Duration) -> Option<usize> {
        let idx = self.stages.partition_point(|s| s.end_offset() <= elapsed);
        (idx < self.stages.len()).then_some(idx)
    }

    /// The stage containing `elapsed`.
    ///
    /// Past the end of the scenario this is a terminal stage with zero target
    /// concurrency and zero duration, starting at the total duration.
    pub fn active_stage(&self, elapsed: Duration) -> Stage {
        match self.index_at(elapsed) {
            Some(i) => self.stages[i],
            None => Stage {
                target_concurrency: 0,
                duration: Duration::ZERO,
                start_offset: self.total,
            },
        }
    }

    /// Target worker count at `elapsed`, honouring the ramp mode.
    pub fn target_concurrency(&self, elapsed: Duration) -> u32 {
        let Some(i) = self.index_at(elapsed) else {
            return 0;
        };
        let stage = self.stages[i];
        match self.ramp {
            RampMode::Jump => stage.target_concurrency,
            RampMode::Linear => {
                let from = self.ramp_from.get(i).copied().unwrap_or(self.initial_target);
                let progress = (elapsed - stage.start_offset).as_secs_f64()
                    / stage.duration.as_secs_f64();
                let from = f64::from(from);
                let to = f64::from(stage.target_concurrency);
                (from + (to - from) * progress).round().max(0.0) as u32
            }
        }
    }

    /// Highest target of any stage (and of the initial target).
    pub fn peak_concurrency(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target_concurrency)
            .chain(std::iter::once(self.initial_target))
            .max()
            .unwrap_or(0)
    }
}

/// Builder for [`Scenario`]; validates on [`build`](ScenarioBuilder::build).
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    name: String,
    stages: Vec<(Duration, u32, Option<u32>)>,
    ramp: RampMode,
    initial_target: u32,
    pending_from: Option<u32>,
}

impl ScenarioBuilder {
    /// Append a stage that lasts `duration` and ends at `target` workers.
    pub fn stage(mut self, duration: Duration, target: u32) -> Self {
        self.stages.push((duration, target, self.pending_from.take()));
        self
    }

    /// Move the target to `target` instantly; the next linear stage ramps
    /// from here.
    pub fn jump(mut self, target: u32) -> Self {
        if self.stages.is_empty() {
            self.initial_target = target;
        } else {
            self.pending_from = Some(target);
        }
        self
    }

    /// Choose the ramp mode. Defaults to [`RampMode::Jump`].
    pub fn ramp(mut self, ramp: RampMode) -> Self {
        self.ramp = ramp;
        self
    }

    /// Worker count a linear first stage ramps from. Defaults to 0.
    pub fn initial_target(mut self, target: u32) -> Self {
        self.initial_target = target;
        self
    }

    /// Validate and compute start offsets.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidField`] for an empty stage list or a
    /// zero-duration stage.
    pub fn build(self) -> Result<Scenario, ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::InvalidField {
                field: format!("scenario '{}'.stages", self.name),
                value: "[]".into(),
                reason: "a scenario needs at least one stage".into(),
            });
        }

        let mut stages = Vec::with_capacity(self.stages.len());
        let mut ramp_from = Vec::with_capacity(self.stages.len());
        let mut previous = self.initial_target;
        let mut offset = Duration::ZERO;
        for (i, (duration, target, from)) in self.stages.into_iter().enumerate() {
            if duration.is_zero() {
                return Err(ConfigError::InvalidField {
                    field: format!("scenario '{}'.stages[{i}].duration", self.name),
                    value: "0s".into(),
                    reason: "stage duration must be greater than zero".into(),
                });
            }
            stages.push(Stage {
                target_concurrency: target,
                duration,
                start_offset: offset,
            });
            ramp_from.push(from.unwrap_or(previous));
            previous = target;
            offset += duration;
        }

        Ok(Scenario {
            name: self.name,
            stages,
            ramp: self.ramp,
            initial_target: self.initial_target,
            ramp_from,
            total: offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn recovery_shape(ramp: RampMode) -> Scenario {
        Scenario::builder("recovery")
            .stage(secs(60), 3)
            .stage(secs(180), 20)
            .stage(secs(10), 2)
            .stage(secs(300), 2)
            .ramp(ramp)
            .build()
            .expect("test: valid scenario")
    }

    #[test]
    fn test_start_offsets_are_cumulative() {
        let s = recovery_shape(RampMode::Jump);
        let offsets: Vec<u64> = s.stages().iter().map(|st| st.start_offset.as_secs()).collect();
        assert_eq!(offsets, vec![0, 60, 240, 250]);
        assert_eq!(s.total_duration(), secs(550));
    }

    #[test]
    fn test_active_stage_contains_elapsed_for_every_second() {
        let s = recovery_shape(RampMode::Jump);
        for t in 0..550 {
            let stage = s.active_stage(secs(t));
            assert!(stage.contains(secs(t)), "t={t} not in {stage:?}");
        }
    }

    #[test]
    fn test_boundary_belongs_to_next_stage() {
        let s = recovery_shape(RampMode::Jump);
        assert_eq!(s.active_stage(secs(60)).target_concurrency, 20);
        assert_eq!(
            s.active_stage(secs(60) - Duration::from_millis(1)).target_concurrency,
            3
        );
    }

    #[test]
    fn test_past_end_is_terminal_zero_stage() {
        let s = recovery_shape(RampMode::Linear);
        for t in [550, 551, 10_000] {
            let stage = s.active_stage(secs(t));
            assert_eq!(stage.target_concurrency, 0);
            assert_eq!(stage.start_offset, s.total_duration());
            assert_eq!(s.target_concurrency(secs(t)), 0);
        }
        assert!(s.is_finished(secs(550)));
        assert!(!s.is_finished(secs(549)));
    }

    #[test]
    fn test_jump_mode_is_constant_within_stage() {
        let s = recovery_shape(RampMode::Jump);
        assert_eq!(s.target_concurrency(secs(0)), 3);
        assert_eq!(s.target_concurrency(secs(59)), 3);
        assert_eq!(s.target_concurrency(secs(61)), 20);
    }

    #[test]
    fn test_linear_mode_ramps_from_previous_target() {
        let s = recovery_shape(RampMode::Linear);
        assert_eq!(s.target_concurrency(secs(0)), 0);
        assert_eq!(s.target_concurrency(secs(30)), 2); // 1.5 rounds up
        assert_eq!(s.target_concurrency(secs(150)), 12); // halfway 3 -> 20 = 11.5
        assert_eq!(s.target_concurrency(secs(245)), 11); // halfway 20 -> 2
        assert_eq!(s.target_concurrency(secs(400)), 2);
    }

    #[test]
    fn test_linear_mode_honours_initial_target() {
        let s = Scenario::builder("hold")
            .stage(secs(10), 10)
            .initial_target(10)
            .ramp(RampMode::Linear)
            .build()
            .expect("test: valid");
        assert_eq!(s.target_concurrency(secs(0)), 10);
        assert_eq!(s.target_concurrency(secs(9)), 10);
    }

    #[test]
    fn test_jump_sets_ramp_origin_of_next_stage() {
        let s = Scenario::builder("load")
            .stage(secs(10), 0)
            .jump(8)
            .stage(secs(10), 8)
            .stage(secs(10), 0)
            .ramp(RampMode::Linear)
            .build()
            .expect("test: valid");
        assert_eq!(s.target_concurrency(secs(5)), 0);
        assert_eq!(s.target_concurrency(secs(10)), 8);
        assert_eq!(s.target_concurrency(secs(25)), 4);
    }

    #[test]
    fn test_empty_scenario_is_rejected() {
        let err = Scenario::builder("empty").build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { .. }));
    }

    #[test]
    fn test_zero_duration_stage_is_rejected() {
        let err = Scenario::builder("bad")
            .stage(secs(10), 1)
            .stage(Duration::ZERO, 2)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("stages[1]"));
    }

    #[test]
    fn test_peak_concurrency() {
        assert_eq!(recovery_shape(RampMode::Jump).peak_concurrency(), 20);
    }
}
