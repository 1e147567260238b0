//! # Virtual Worker Executor
//!
//! ## Responsibility
//! Keep `N(t)` virtual workers running, where `N(t)` is sampled from a
//! [`Scenario`] every control interval, and drive each worker through
//! repeated iterations of an [`IterationBody`].
//!
//! ## Guarantees
//! - Cooperative exit: workers check for shutdown and for being above the
//!   target only at iteration boundaries; an in-flight iteration completes
//! - Isolated failures: an iteration error is recorded, backed off, and the
//!   worker carries on
//! - No new iteration starts after the scenario ends, the deadline passes,
//!   the iteration budget is spent, or the run is aborted
//!
//! ## NOT Responsible For
//! - Deciding what an iteration does (see: `scenarios::WorkloadBody`)
//! - Retrying failed requests

use crate::config::ExecutorConfig;
use crate::metrics;
use crate::scenario::Scenario;
use crate::sink::{Labels, MetricSink};
use crate::HarnessError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Executor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    /// How often the target concurrency is re-sampled.
    pub control_interval: Duration,
    /// Hard wall-clock budget; the run ends at the earlier of this and the
    /// scenario's total duration.
    pub deadline: Option<Duration>,
    /// Total iterations across all workers; `None` is unlimited.
    pub max_iterations: Option<u64>,
    /// Rate series that receives one observation per iteration (`true` on failure).
    pub failure_series: String,
    /// `scenario` label on the active-workers gauge.
    pub scenario_label: String,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            control_interval: Duration::from_millis(100),
            deadline: None,
            max_iterations: None,
            failure_series: "error_rate".to_string(),
            scenario_label: "default".to_string(),
        }
    }
}

impl ExecutorOptions {
    /// Options from the `executor` config section.
    pub fn from_config(config: &ExecutorConfig, scenario_label: impl Into<String>) -> Self {
        Self {
            control_interval: config.control_interval,
            deadline: config.deadline,
            scenario_label: scenario_label.into(),
            ..Self::default()
        }
    }
}

/// Per-iteration values handed to the body.
#[derive(Debug, Clone, Copy)]
pub struct IterationContext {
    /// Worker slot, `0..N(t)`.
    pub worker_id: u32,
    /// Iterations this worker has started before this one.
    pub iteration: u64,
    /// Run-wide iteration sequence number, unique per iteration.
    pub sequence: u64,
    /// Time since run start when the iteration began.
    pub elapsed: Duration,
    run_started: Instant,
}

impl IterationContext {
    /// Context for driving a body outside the executor.
    pub fn new(worker_id: u32, iteration: u64, sequence: u64, run_started: Instant) -> Self {
        Self {
            worker_id,
            iteration,
            sequence,
            elapsed: run_started.elapsed(),
            run_started,
        }
    }

    /// Time since run start, now.
    pub fn run_elapsed(&self) -> Duration {
        self.run_started.elapsed()
    }
}

/// One iteration of work, run repeatedly by every worker.
#[async_trait]
pub trait IterationBody: Send + Sync + 'static {
    /// Run one iteration and return how long to pause before the next.
    ///
    /// # Errors
    ///
    /// Any error marks the iteration failed; the worker then sleeps for
    /// [`backoff`](IterationBody::backoff) and continues.
    async fn run(&self, ctx: &IterationContext) -> Result<Duration, HarnessError>;

    /// Pause after a failed iteration. Defaults to one second.
    fn backoff(&self, _ctx: &IterationContext, _err: &HarnessError) -> Duration {
        Duration::from_secs(1)
    }
}

/// Totals for one worker lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Worker slot.
    pub worker_id: u32,
    /// Iterations completed.
    pub iterations: u64,
    /// Iterations that returned an error.
    pub failures: u64,
}

/// Result of [`Executor::run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionSummary {
    /// Iterations completed across all workers.
    pub iterations: u64,
    /// Failed iterations across all workers.
    pub failures: u64,
    /// Most workers alive at once.
    pub peak_workers: u32,
    /// Wall-clock time of the run, including draining in-flight iterations.
    #[serde(serialize_with = "serialize_ms")]
    pub elapsed: Duration,
    /// Whether the run ended on an abort signal.
    pub aborted: bool,
    /// One entry per worker lifetime, in join order.
    pub workers: Vec<WorkerStats>,
}

fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Drives a [`Scenario`] with virtual workers.
pub struct Executor {
    scenario: Arc<Scenario>,
    sink: Arc<MetricSink>,
    options: ExecutorOptions,
}

struct WorkerShared {
    body: Arc<dyn IterationBody>,
    sink: Arc<MetricSink>,
    failure_series: String,
    run_started: Instant,
    /// Run-relative end; no iteration starts at or after it.
    end: Duration,
    sequence: AtomicU64,
    max_iterations: Option<u64>,
}

impl Executor {
    /// Create an executor for `scenario` that records into `sink`.
    pub fn new(scenario: Scenario, sink: Arc<MetricSink>, options: ExecutorOptions) -> Self {
        Self {
            scenario: Arc::new(scenario),
            sink,
            options,
        }
    }

    /// The scenario being driven.
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Run the scenario to completion.
    ///
    /// Sending `true` on `abort` ends the run early; workers finish their
    /// current iteration and exit. Dropping the sender has no effect.
    ///
    /// # Panics
    ///
    /// This function never panics. A panicking iteration body ends only its
    /// own worker, which is logged.
    pub async fn run(
        &self,
        body: Arc<dyn IterationBody>,
        mut abort: watch::Receiver<bool>,
    ) -> ExecutionSummary {
        let run_started = Instant::now();
        let end = self
            .options
            .deadline
            .map_or(self.scenario.total_duration(), |d| {
                d.min(self.scenario.total_duration())
            });

        let shared = Arc::new(WorkerShared {
            body,
            sink: Arc::clone(&self.sink),
            failure_series: self.options.failure_series.clone(),
            run_started,
            end,
            sequence: AtomicU64::new(0),
            max_iterations: self.options.max_iterations,
        });

        let (target_tx, target_rx) = watch::channel(0u32);
        let (shutdown_tx, _) = watch::channel(false);
        let mut workers: BTreeMap<u32, JoinHandle<WorkerStats>> = BTreeMap::new();
        let mut finished: Vec<WorkerStats> = Vec::new();
        let mut peak_workers = 0u32;
        let mut aborted = false;
        let mut abort_open = true;

        let mut ticker = tokio::time::interval(self.options.control_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            scenario = self.scenario.name(),
            stages = self.scenario.stages().len(),
            end_ms = end.as_millis() as u64,
            "run starting"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = abort.changed(), if abort_open => {
                    if changed.is_err() {
                        abort_open = false;
                    }
                }
            }

            if *abort.borrow() {
                tracing::warn!(scenario = self.scenario.name(), "abort signal received");
                aborted = true;
                break;
            }

            let elapsed = run_started.elapsed();
            if elapsed >= end {
                break;
            }
            if self.budget_spent(&shared) && workers.values().all(JoinHandle::is_finished) {
                tracing::info!(scenario = self.scenario.name(), "iteration budget spent");
                break;
            }

            let target = self.scenario.target_concurrency(elapsed);
            target_tx.send_replace(target);

            let done: Vec<u32> = workers
                .iter()
                .filter(|(_, h)| h.is_finished())
                .map(|(id, _)| *id)
                .collect();
            for id in done {
                if let Some(handle) = workers.remove(&id) {
                    finished.push(join_worker(id, handle).await);
                }
            }

            if !self.budget_spent(&shared) {
                for id in 0..target {
                    if workers.contains_key(&id) {
                        continue;
                    }
                    tracing::debug!(worker = id, target, "worker joining");
                    let shared = Arc::clone(&shared);
                    let target_rx = target_rx.clone();
                    let mut shutdown_rx = shutdown_tx.subscribe();
                    let handle = tokio::spawn(async move {
                        worker_loop(id, shared, target_rx, &mut shutdown_rx).await
                    });
                    workers.insert(id, handle);
                }
            }

            let active = workers.len() as u32;
            peak_workers = peak_workers.max(active);
            metrics::set_active_workers(&self.options.scenario_label, i64::from(active));
            self.sink.add_trend("vus", f64::from(active), Labels::new());
        }

        shutdown_tx.send_replace(true);
        let draining = workers
            .into_iter()
            .map(|(id, handle)| join_worker(id, handle));
        finished.extend(futures::future::join_all(draining).await);
        metrics::set_active_workers(&self.options.scenario_label, 0);

        let summary = ExecutionSummary {
            iterations: finished.iter().map(|w| w.iterations).sum(),
            failures: finished.iter().map(|w| w.failures).sum(),
            peak_workers,
            elapsed: run_started.elapsed(),
            aborted,
            workers: finished,
        };

        tracing::info!(
            scenario = self.scenario.name(),
            iterations = summary.iterations,
            failures = summary.failures,
            peak_workers = summary.peak_workers,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            aborted = summary.aborted,
            "run finished"
        );

        summary
    }

    fn budget_spent(&self, shared: &WorkerShared) -> bool {
        shared
            .max_iterations
            .is_some_and(|max| shared.sequence.load(Ordering::SeqCst) >= max)
    }
}

async fn join_worker(id: u32, handle: JoinHandle<WorkerStats>) -> WorkerStats {
    match handle.await {
        Ok(stats) => {
            tracing::debug!(
                worker = id,
                iterations = stats.iterations,
                failures = stats.failures,
                "worker left"
            );
            stats
        }
        Err(e) => {
            tracing::error!(worker = id, error = %e, "worker task panicked");
            WorkerStats {
                worker_id: id,
                ..Default::default()
            }
        }
    }
}

async fn worker_loop(
    id: u32,
    shared: Arc<WorkerShared>,
    target_rx: watch::Receiver<u32>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> WorkerStats {
    let mut stats = WorkerStats {
        worker_id: id,
        ..Default::default()
    };

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        if id >= *target_rx.borrow() {
            break;
        }
        let elapsed = shared.run_started.elapsed();
        if elapsed >= shared.end {
            break;
        }

        let sequence = shared.sequence.fetch_add(1, Ordering::SeqCst);
        if shared.max_iterations.is_some_and(|max| sequence >= max) {
            break;
        }

        let ctx = IterationContext {
            worker_id: id,
            iteration: stats.iterations,
            sequence,
            elapsed,
            run_started: shared.run_started,
        };

        let pause = match shared.body.run(&ctx).await {
            Ok(pause) => {
                shared
                    .sink
                    .add_rate(&shared.failure_series, false, Labels::new());
                metrics::inc_iteration(metrics::OUTCOME_SUCCESS);
                pause
            }
            Err(e) => {
                stats.failures += 1;
                shared
                    .sink
                    .add_rate(&shared.failure_series, true, Labels::new());
                metrics::inc_iteration(metrics::OUTCOME_FAILURE);
                tracing::warn!(
                    worker = id,
                    iteration = ctx.iteration,
                    error_kind = e.kind(),
                    error = %e,
                    "iteration failed"
                );
                shared.body.backoff(&ctx, &e)
            }
        };
        stats.iterations += 1;

        let remaining = shared.end.saturating_sub(shared.run_started.elapsed());
        let pause = pause.min(remaining);
        if pause.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        fail_every: u64,
    }

    #[async_trait]
    impl IterationBody for Counting {
        async fn run(&self, ctx: &IterationContext) -> Result<Duration, HarnessError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.fail_every > 0 && ctx.sequence % self.fail_every == 0 {
                return Err(HarnessError::Transport("connection refused".into()));
            }
            Ok(Duration::from_millis(5))
        }

        fn backoff(&self, _ctx: &IterationContext, _err: &HarnessError) -> Duration {
            Duration::from_millis(10)
        }
    }

    fn options() -> ExecutorOptions {
        ExecutorOptions {
            control_interval: Duration::from_millis(10),
            ..ExecutorOptions::default()
        }
    }

    fn scenario(ms: u64, workers: u32) -> Scenario {
        Scenario::builder("unit")
            .stage(Duration::from_millis(ms), workers)
            .build()
            .expect("test: valid scenario")
    }

    #[tokio::test]
    async fn test_run_reaches_target_and_stops() {
        let sink = Arc::new(MetricSink::new());
        let exec = Executor::new(scenario(200, 3), Arc::clone(&sink), options());
        let (_tx, rx) = watch::channel(false);
        let summary = exec.run(Arc::new(Counting { fail_every: 0 }), rx).await;

        assert_eq!(summary.peak_workers, 3);
        assert!(summary.iterations > 3);
        assert_eq!(summary.failures, 0);
        assert!(!summary.aborted);
        assert_eq!(
            sink.count("error_rate", &Labels::new()) as u64,
            summary.iterations
        );
    }

    #[tokio::test]
    async fn test_failures_are_recorded_and_worker_continues() {
        let sink = Arc::new(MetricSink::new());
        let exec = Executor::new(scenario(200, 1), Arc::clone(&sink), options());
        let (_tx, rx) = watch::channel(false);
        let summary = exec.run(Arc::new(Counting { fail_every: 2 }), rx).await;

        assert!(summary.failures >= 1);
        assert!(summary.iterations > summary.failures);
        let rate = sink.rate_of("error_rate", &Labels::new()).expect("test: has data");
        assert!(rate > 0.0 && rate < 1.0);
    }

    #[tokio::test]
    async fn test_max_iterations_is_exact() {
        let sink = Arc::new(MetricSink::new());
        let opts = ExecutorOptions {
            max_iterations: Some(3),
            ..options()
        };
        let exec = Executor::new(scenario(10_000, 1), sink, opts);
        let (_tx, rx) = watch::channel(false);
        let started = Instant::now();
        let summary = exec.run(Arc::new(Counting { fail_every: 0 }), rx).await;

        assert_eq!(summary.iterations, 3);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_abort_ends_run_early() {
        let sink = Arc::new(MetricSink::new());
        let exec = Executor::new(scenario(10_000, 2), sink, options());
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });
        let summary = exec.run(Arc::new(Counting { fail_every: 0 }), rx).await;

        assert!(summary.aborted);
        assert!(summary.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_deadline_shortens_run() {
        let sink = Arc::new(MetricSink::new());
        let opts = ExecutorOptions {
            deadline: Some(Duration::from_millis(50)),
            ..options()
        };
        let exec = Executor::new(scenario(10_000, 1), sink, opts);
        let (_tx, rx) = watch::channel(false);
        let summary = exec.run(Arc::new(Counting { fail_every: 0 }), rx).await;

        assert!(!summary.aborted);
        assert!(summary.elapsed < Duration::from_secs(5));
    }

    /// Zero pause, 5 ms per iteration; remembers every start time.
    #[derive(Default)]
    struct Starts(parking_lot::Mutex<Vec<Duration>>);

    #[async_trait]
    impl IterationBody for Starts {
        async fn run(&self, ctx: &IterationContext) -> Result<Duration, HarnessError> {
            self.0.lock().push(ctx.elapsed);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn test_workers_stop_at_scenario_end_between_control_ticks() {
        // The default 100 ms tick is longer than the whole scenario.
        let exec = Executor::new(
            scenario(50, 1),
            Arc::new(MetricSink::new()),
            ExecutorOptions::default(),
        );
        let body = Arc::new(Starts::default());
        let (_tx, rx) = watch::channel(false);
        exec.run(Arc::clone(&body) as Arc<dyn IterationBody>, rx).await;

        let starts = body.0.lock();
        assert!(!starts.is_empty());
        let late: Vec<_> = starts
            .iter()
            .filter(|at| **at >= Duration::from_millis(50))
            .collect();
        assert!(late.is_empty(), "iterations started after the end: {late:?}");
    }

    #[tokio::test]
    async fn test_pause_is_cut_short_at_scenario_end() {
        struct LongPause;

        #[async_trait]
        impl IterationBody for LongPause {
            async fn run(&self, _ctx: &IterationContext) -> Result<Duration, HarnessError> {
                Ok(Duration::from_secs(30))
            }
        }

        let exec = Executor::new(scenario(60, 1), Arc::new(MetricSink::new()), options());
        let (_tx, rx) = watch::channel(false);
        let summary = exec.run(Arc::new(LongPause), rx).await;

        assert_eq!(summary.iterations, 1);
        assert!(summary.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_options_from_config() {
        let cfg = ExecutorConfig {
            control_interval: Duration::from_millis(250),
            deadline: Some(Duration::from_secs(60)),
        };
        let opts = ExecutorOptions::from_config(&cfg, "spike");
        assert_eq!(opts.control_interval, Duration::from_millis(250));
        assert_eq!(opts.deadline, Some(Duration::from_secs(60)));
        assert_eq!(opts.scenario_label, "spike");
        assert_eq!(opts.failure_series, "error_rate");
    }
}
