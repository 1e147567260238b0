//! # Preset Scenarios
//!
//! ## Responsibility
//! Turn a `(kind, target)` pair and the resolved [`Config`] into everything a
//! run needs: stages, phase boundaries, detector tuning, thresholds, pacing
//! and the workload the iteration body sends.
//!
//! ## Guarantees
//! - Every preset is validated on construction; a malformed stage list or
//!   threshold is a [`ConfigError`] before any worker starts
//! - Presets are plain values; building one has no side effects

pub mod body;
pub mod prompts;

pub use body::{
    BatchPolicy, BatchSizes, BatchWorkload, ChatWorkload, DecodeWorkload, EmbedWorkload,
    FimWorkload, Pacing, PauseRange, PrefillWorkload, PromptSource, Recording, TextSource,
    Workload, WorkloadBody,
};

use crate::client::{RequestClient, Transport};
use crate::config::duration::format_duration;
use crate::config::validation::ConfigError;
use crate::config::Config;
use crate::executor::ExecutorOptions;
use crate::phase::PhaseClassifier;
use crate::recovery::{DetectorConfig, SharedDetector};
use crate::report::Threshold;
use crate::scenario::{RampMode, Scenario};
use crate::sink::MetricSink;
use serde::Serialize;
use serde_json::json;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::time::Duration;

/// Load pattern or workload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// One worker, three iterations: is the endpoint up at all.
    Smoke,
    /// Ramp to the configured VU count, hold, ramp down.
    Load,
    /// Moderate load held for a long time.
    Soak,
    /// Sudden surge, then back to baseline.
    Spike,
    /// Step up until the API degrades.
    Stress,
    /// Baseline, overload, then measure how long latency takes to recover.
    Recovery,
    /// Editor-style code completion that keeps extending one prefix.
    PrefixCaching,
    /// Long documents and conversation history in, short answers out.
    PrefillHeavy,
    /// Short prompts in, long answers out.
    DecodeHeavy,
    /// One embedding batch per iteration, sizes 2, 3 and 5.
    BatchEmbeddings,
    /// Constant 1, 2 and 5 workers, one minute each.
    Benchmark,
}

impl ScenarioKind {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smoke => "smoke",
            Self::Load => "load",
            Self::Soak => "soak",
            Self::Spike => "spike",
            Self::Stress => "stress",
            Self::Recovery => "recovery",
            Self::PrefixCaching => "prefix-caching",
            Self::PrefillHeavy => "prefill-heavy",
            Self::DecodeHeavy => "decode-heavy",
            Self::BatchEmbeddings => "batch-embeddings",
            Self::Benchmark => "benchmark",
        }
    }

    /// The only target this pattern runs against, if it is tied to one.
    pub fn only_target(self) -> Option<Target> {
        match self {
            Self::PrefixCaching | Self::PrefillHeavy | Self::DecodeHeavy => {
                Some(Target::Completions)
            }
            Self::BatchEmbeddings => Some(Target::Embeddings),
            _ => None,
        }
    }

    /// Whether `target` is valid for this pattern.
    pub fn supports(self, target: Target) -> bool {
        self.only_target().map_or(true, |only| only == target)
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API surface under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Chat completions.
    Completions,
    /// Embeddings.
    Embeddings,
}

impl Target {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completions => "completions",
            Self::Embeddings => "embeddings",
        }
    }

    /// Model identifier for this target from `config`.
    pub fn model(self, config: &Config) -> &str {
        match self {
            Self::Completions => &config.target.completion_model,
            Self::Embeddings => &config.target.embedding_model,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to run one load pattern against one target.
#[derive(Debug, Clone)]
pub struct Preset {
    /// Load pattern.
    pub kind: ScenarioKind,
    /// API surface.
    pub target: Target,
    /// Stage timeline.
    pub scenario: Scenario,
    /// Total iteration budget, for fixed-iteration patterns.
    pub max_iterations: Option<u64>,
    /// Phase boundaries, for patterns that label observations by phase.
    pub phases: Option<PhaseClassifier>,
    /// Stabilization detector tuning, for patterns that measure recovery.
    pub detector: Option<DetectorConfig>,
    /// Pass/fail criteria.
    pub thresholds: Vec<Threshold>,
    /// Rate series fed one observation per iteration.
    pub failure_series: &'static str,
    /// What each iteration sends.
    pub workload: Workload,
    /// Pauses between iterations.
    pub pacing: Pacing,
    /// Extra series the body records.
    pub recording: Recording,
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn thresholds(pairs: &[(&str, &str)]) -> Result<Vec<Threshold>, ConfigError> {
    pairs
        .iter()
        .map(|(series, expr)| Threshold::parse(series, expr))
        .collect()
}

fn staged(name: &str, stages: &[(Duration, u32)]) -> Result<Scenario, ConfigError> {
    stages
        .iter()
        .fold(Scenario::builder(name).ramp(RampMode::Linear), |b, (d, t)| {
            b.stage(*d, *t)
        })
        .build()
}

/// Build the preset for `kind` against `target`.
///
/// The `load` pattern takes its stages from `config.runs`; every other
/// pattern has a fixed shape.
///
/// # Errors
///
/// [`ConfigError`] if `kind` does not run against `target`, or if the
/// resulting stage list, phase boundaries or thresholds are invalid (for
/// `load`, e.g. all-zero run timings).
pub fn preset(kind: ScenarioKind, target: Target, config: &Config) -> Result<Preset, ConfigError> {
    use Target::{Completions, Embeddings};

    if let Some(only) = kind.only_target().filter(|only| *only != target) {
        return Err(ConfigError::InvalidField {
            field: "target".into(),
            value: target.to_string(),
            reason: format!("{kind} runs against {only} only"),
        });
    }

    let name = format!("{kind}-{target}");
    let mut preset = Preset {
        kind,
        target,
        scenario: Scenario::builder(&name).stage(secs(1), 1).build()?,
        max_iterations: None,
        phases: None,
        detector: None,
        thresholds: Vec::new(),
        failure_series: "error_rate",
        workload: Workload::Embed(EmbedWorkload {
            texts: TextSource::Random(prompts::LOAD_TEXTS),
            batch: None,
        }),
        pacing: Pacing::none(),
        recording: Recording::default(),
    };

    match kind {
        ScenarioKind::Smoke => {
            preset.scenario = Scenario::builder(&name).stage(secs(600), 1).build()?;
            preset.max_iterations = Some(3);
            let p95 = if target == Completions { "p(95)<5000" } else { "p(95)<3000" };
            preset.thresholds = thresholds(&[
                ("http_req_failed", "rate<0.01"),
                ("http_req_duration", p95),
            ])?;
            preset.workload = match target {
                Completions => Workload::Chat(ChatWorkload {
                    prompts: PromptSource::Cycle(prompts::SMOKE_PROMPTS),
                    max_tokens: Some(20),
                    stress_max_tokens: None,
                    temperature: Some(0.3),
                }),
                Embeddings => Workload::Embed(EmbedWorkload {
                    texts: TextSource::Cycle(prompts::SMOKE_TEXTS),
                    batch: None,
                }),
            };
        }

        ScenarioKind::Load => {
            let runs = &config.runs;
            let mut builder = Scenario::builder(&name).ramp(RampMode::Linear);
            for (duration, target) in [
                (runs.time_wait, 0),
                (runs.time_ramp_up, runs.vus),
                (runs.time_load, runs.vus),
                (runs.time_ramp_down, 0),
            ] {
                builder = if duration.is_zero() {
                    builder.jump(target)
                } else {
                    builder.stage(duration, target)
                };
            }
            preset.scenario = builder.build()?;
            preset.workload = match target {
                Completions => Workload::Chat(ChatWorkload {
                    prompts: PromptSource::Random(prompts::LOAD_PROMPTS),
                    max_tokens: None,
                    stress_max_tokens: None,
                    temperature: None,
                }),
                Embeddings => Workload::Embed(EmbedWorkload {
                    texts: TextSource::Random(prompts::LOAD_TEXTS),
                    batch: None,
                }),
            };
            if target == Embeddings {
                preset.recording.latency_series = "embedding_latency";
            }
        }

        ScenarioKind::Soak => {
            preset.recording.hourly = true;
            match target {
                Completions => {
                    preset.scenario =
                        staged(&name, &[(secs(300), 5), (secs(1800), 5), (secs(300), 0)])?;
                    preset.thresholds = thresholds(&[
                        ("response_time", "p(90)<10000"),
                        ("error_rate", "rate<0.05"),
                    ])?;
                    preset.workload = Workload::Chat(ChatWorkload {
                        prompts: PromptSource::Random(prompts::SOAK_PROMPTS),
                        max_tokens: Some(100),
                        stress_max_tokens: None,
                        temperature: Some(0.7),
                    });
                    preset.pacing = Pacing::uniform(PauseRange::millis(2000, 7000), secs(10));
                }
                Embeddings => {
                    preset.scenario =
                        staged(&name, &[(secs(180), 5), (secs(900), 5), (secs(120), 0)])?;
                    preset.thresholds = thresholds(&[
                        ("response_time", "p(90)<5000"),
                        ("error_rate", "rate<0.05"),
                    ])?;
                    preset.workload = Workload::Embed(EmbedWorkload {
                        texts: TextSource::ByElapsed(prompts::SOAK_TEXTS),
                        batch: Some(BatchPolicy {
                            probability: 0.2,
                            sizes: BatchSizes::Between(2, 4),
                            latency_series: "batch_response_time",
                            tag: false,
                        }),
                    });
                    preset.pacing = Pacing::uniform(PauseRange::millis(1000, 5000), secs(10));
                }
            }
        }

        ScenarioKind::Spike => {
            preset.failure_series = "failure_rate";
            preset.phases = Some(PhaseClassifier::three_phase(secs(60), secs(100))?);
            preset.detector = Some(DetectorConfig::with_tolerance(1.2));
            match target {
                Completions => {
                    preset.scenario = staged(
                        &name,
                        &[
                            (secs(60), 2),
                            (secs(10), 25),
                            (secs(30), 25),
                            (secs(60), 2),
                            (secs(180), 2),
                        ],
                    )?;
                    preset.thresholds = thresholds(&[
                        ("failure_rate", "rate<0.3"),
                        ("response_time", "p(99)<30000"),
                    ])?;
                    preset.workload = Workload::Chat(ChatWorkload {
                        prompts: PromptSource::Random(prompts::SPIKE_PROMPTS),
                        max_tokens: Some(60),
                        stress_max_tokens: None,
                        temperature: Some(0.5),
                    });
                    preset.pacing = Pacing {
                        pause: PauseRange::millis(0, 3000),
                        stress_pause: Some(PauseRange::millis(0, 1000)),
                        backoff: secs(1),
                        stress_backoff: Some(secs(3)),
                    };
                }
                Embeddings => {
                    preset.scenario = staged(
                        &name,
                        &[
                            (secs(60), 2),
                            (secs(10), 30),
                            (secs(30), 30),
                            (secs(30), 2),
                            (secs(120), 2),
                        ],
                    )?;
                    preset.thresholds = thresholds(&[
                        ("failure_rate", "rate<0.3"),
                        ("response_time", "p(99)<20000"),
                    ])?;
                    preset.workload = Workload::Embed(EmbedWorkload {
                        texts: TextSource::Random(prompts::SPIKE_TEXTS),
                        batch: None,
                    });
                    preset.pacing = Pacing {
                        pause: PauseRange::millis(1000, 3000),
                        stress_pause: Some(PauseRange::millis(500, 500)),
                        backoff: secs(1),
                        stress_backoff: Some(secs(2)),
                    };
                }
            }
        }

        ScenarioKind::Stress => match target {
            Completions => {
                preset.scenario = staged(
                    &name,
                    &[
                        (secs(60), 1),
                        (secs(60), 5),
                        (secs(180), 25),
                        (secs(180), 50),
                        (secs(240), 100),
                        (secs(60), 0),
                    ],
                )?;
                preset.thresholds = thresholds(&[
                    ("http_req_failed", "rate<0.1"),
                    ("response_time", "p(95)<15000"),
                    ("api_errors", "count<50"),
                ])?;
                preset.workload = Workload::Chat(ChatWorkload {
                    prompts: PromptSource::Synthetic,
                    max_tokens: Some(150),
                    stress_max_tokens: None,
                    temperature: Some(0.7),
                });
                preset.pacing = Pacing::uniform(PauseRange::millis(0, 1000), secs(5));
            }
            Embeddings => {
                preset.scenario = staged(
                    &name,
                    &[
                        (secs(30), 3),
                        (secs(60), 5),
                        (secs(120), 10),
                        (secs(120), 15),
                        (secs(60), 20),
                        (secs(60), 0),
                    ],
                )?;
                preset.thresholds = thresholds(&[
                    ("http_req_failed", "rate<0.1"),
                    ("response_time", "p(95)<10000"),
                    ("api_errors", "count<100"),
                ])?;
                preset.workload = Workload::Embed(EmbedWorkload {
                    texts: TextSource::ByWorker(prompts::STRESS_TEXTS),
                    batch: Some(BatchPolicy {
                        probability: 0.3,
                        sizes: BatchSizes::OneOf(&[2, 3, 5]),
                        latency_series: "response_time",
                        tag: true,
                    }),
                });
                preset.pacing = Pacing::uniform(PauseRange::millis(500, 3500), secs(5));
            }
        },

        ScenarioKind::Recovery => {
            preset.thresholds = thresholds(&[
                ("error_rate", "rate<0.2"),
                ("stabilization_time", "avg<60000"),
            ])?;
            match target {
                Completions => {
                    preset.scenario = staged(
                        &name,
                        &[(secs(60), 3), (secs(180), 20), (secs(10), 2), (secs(300), 2)],
                    )?;
                    preset.phases = Some(PhaseClassifier::three_phase(secs(60), secs(240))?);
                    preset.detector = Some(DetectorConfig::with_tolerance(1.2));
                    preset.workload = Workload::Chat(ChatWorkload {
                        prompts: PromptSource::Random(prompts::RECOVERY_PROMPTS),
                        max_tokens: Some(50),
                        stress_max_tokens: Some(150),
                        temperature: Some(0.5),
                    });
                    preset.pacing = Pacing {
                        pause: PauseRange::millis(1000, 3000),
                        stress_pause: Some(PauseRange::millis(0, 500)),
                        backoff: secs(5),
                        stress_backoff: None,
                    };
                }
                Embeddings => {
                    preset.scenario = staged(
                        &name,
                        &[(secs(60), 2), (secs(120), 25), (secs(10), 2), (secs(240), 2)],
                    )?;
                    preset.phases = Some(PhaseClassifier::three_phase(secs(60), secs(180))?);
                    preset.detector = Some(DetectorConfig::with_tolerance(1.3));
                    preset.workload = Workload::Embed(EmbedWorkload {
                        texts: TextSource::Random(prompts::RECOVERY_TEXTS),
                        batch: None,
                    });
                    preset.pacing = Pacing {
                        pause: PauseRange::millis(500, 1500),
                        stress_pause: Some(PauseRange::millis(0, 200)),
                        backoff: secs(3),
                        stress_backoff: None,
                    };
                }
            }
        }

        ScenarioKind::PrefixCaching => {
            preset.scenario = staged(&name, &[(secs(30), 1), (secs(60), 1), (secs(30), 0)])?;
            preset.workload = Workload::Fim(FimWorkload {
                prefixes: prompts::FIM_PREFIXES,
                max_tokens: config.workload.fim_max_tokens,
                max_prefix_chars: 2000,
                keep_chars: 500,
            });
        }

        ScenarioKind::PrefillHeavy => {
            preset.scenario = staged(&name, &[(secs(30), 1), (secs(120), 2), (secs(30), 0)])?;
            preset.failure_series = "failure_rate";
            preset.thresholds = thresholds(&[
                ("prefill_processing_time", "p(95)<20000"),
                ("failure_rate", "rate<0.1"),
            ])?;
            preset.workload = Workload::Prefill(PrefillWorkload {
                contexts: prompts::LONG_CONTEXTS,
                follow_ups: prompts::FOLLOW_UPS,
                max_turns: 3,
                max_tokens: 150,
                temperature: 0.3,
            });
            preset.pacing = Pacing::uniform(PauseRange::millis(2000, 5000), secs(10));
            preset.recording.latency_series = "prefill_processing_time";
        }

        ScenarioKind::DecodeHeavy => {
            preset.scenario = staged(&name, &[(secs(30), 1), (secs(120), 2), (secs(30), 0)])?;
            preset.failure_series = "failure_rate";
            preset.thresholds = thresholds(&[
                ("token_generation_rate", "p(50)>5"),
                ("failure_rate", "rate<0.1"),
            ])?;
            preset.workload = Workload::Decode(DecodeWorkload {
                prompts: prompts::LONG_ANSWER_PROMPTS,
                audiences: prompts::AUDIENCES,
                angles: prompts::ANGLES,
                max_tokens: config.workload.max_output_tokens,
                temperature: 0.7,
                pause_per_token: Duration::from_millis(5),
            });
            preset.pacing = Pacing::uniform(PauseRange::millis(0, 5000), secs(15));
            preset.recording.latency_series = "output_generation_time";
        }

        ScenarioKind::BatchEmbeddings => {
            preset.scenario = staged(&name, &[(secs(30), 1), (secs(60), 2), (secs(30), 0)])?;
            preset.workload = Workload::Batch(BatchWorkload {
                texts: prompts::BATCH_TEXTS,
                sizes: &[2, 3, 5],
            });
            preset.recording.latency_series = "batch_embedding_latency";
        }

        ScenarioKind::Benchmark => {
            preset.scenario = Scenario::builder(&name)
                .stage(secs(60), 1)
                .stage(secs(60), 2)
                .stage(secs(60), 5)
                .build()?;
            preset.recording.by_workers = true;
            match target {
                Completions => {
                    preset.workload = Workload::Chat(ChatWorkload {
                        prompts: PromptSource::Random(prompts::BENCHMARK_PROMPTS),
                        max_tokens: None,
                        stress_max_tokens: None,
                        temperature: None,
                    });
                    preset.recording.latency_series = "completion_latency";
                }
                Embeddings => {
                    preset.workload = Workload::Embed(EmbedWorkload {
                        texts: TextSource::Random(prompts::BENCHMARK_TEXTS),
                        batch: None,
                    });
                    preset.recording.latency_series = "embedding_latency";
                }
            }
        }
    }

    Ok(preset)
}

impl Preset {
    /// `<kind>-<target>`.
    pub fn name(&self) -> &str {
        self.scenario.name()
    }

    /// Model identifier sent with every request.
    pub fn model<'a>(&self, config: &'a Config) -> &'a str {
        match (self.kind, &config.target.coding_model) {
            (ScenarioKind::PrefixCaching, Some(model)) => model,
            _ => self.target.model(config),
        }
    }

    /// Executor options for this preset under `config`.
    pub fn executor_options(&self, config: &Config) -> ExecutorOptions {
        ExecutorOptions {
            max_iterations: self.max_iterations,
            failure_series: self.failure_series.to_string(),
            ..ExecutorOptions::from_config(&config.executor, self.name())
        }
    }

    /// Shared detector recording into `sink`, if this preset measures recovery.
    ///
    /// # Errors
    ///
    /// See [`DetectorConfig::validate`].
    pub fn detector(&self, sink: &Arc<MetricSink>) -> Result<Option<SharedDetector>, ConfigError> {
        self.detector
            .map(|cfg| SharedDetector::new(cfg, Arc::clone(sink)))
            .transpose()
    }

    /// Iteration body sending through `client`.
    pub fn body(&self, client: RequestClient, detector: Option<SharedDetector>) -> WorkloadBody {
        let mut body = WorkloadBody::new(client, self.workload, self.pacing, self.recording);
        if self.recording.by_workers {
            body = body.with_levels(self.scenario.clone());
        }
        match &self.phases {
            Some(phases) => body.with_phases(phases.clone(), detector),
            None => body,
        }
    }

    /// Human-readable timeline: stages, phases, detector and thresholds.
    pub fn plan(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_plan(&mut out);
        out
    }

    fn write_plan(&self, out: &mut String) -> fmt::Result {
        writeln!(
            out,
            "{} ({:?} ramp, total {})",
            self.name(),
            self.scenario.ramp_mode(),
            format_duration(self.scenario.total_duration())
        )?;
        if let Some(max) = self.max_iterations {
            writeln!(out, "  iterations: {max}")?;
        }
        writeln!(out, "stages")?;
        for stage in self.scenario.stages() {
            writeln!(
                out,
                "  {:>8} +{:<8} -> {} workers",
                format_duration(stage.start_offset),
                format_duration(stage.duration),
                stage.target_concurrency
            )?;
        }
        if let Some(phases) = &self.phases {
            writeln!(out, "phases")?;
            for (phase, start, end) in phases.intervals() {
                let end = end.map_or_else(|| "end".to_string(), format_duration);
                writeln!(out, "  {:<9} {} .. {end}", phase.as_str(), format_duration(start))?;
            }
        }
        if let Some(detector) = &self.detector {
            writeln!(
                out,
                "detector: tolerance {}, window {}, min samples {}",
                detector.tolerance_factor, detector.window_capacity, detector.min_samples
            )?;
        }
        if !self.thresholds.is_empty() {
            writeln!(out, "thresholds")?;
            for t in &self.thresholds {
                writeln!(out, "  {} {}", t.series, t.expression)?;
            }
        }
        Ok(())
    }
}

/// Request client for `preset` configured from `config`: bearer token,
/// model and network debugging.
pub fn build_client(
    config: &Config,
    preset: &Preset,
    transport: Arc<dyn Transport>,
    sink: Arc<MetricSink>,
) -> RequestClient {
    RequestClient::new(transport, config.target.base_url.as_str(), sink)
        .with_bearer(&config.target.api_key)
        .with_option("model", json!(preset.model(config)))
        .with_network_debug(config.observability.network_debug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use clap::ValueEnum;

    #[test]
    fn test_every_preset_builds_for_its_targets() {
        let config = Config::default();
        for kind in ScenarioKind::value_variants() {
            for target in [Target::Completions, Target::Embeddings] {
                if !kind.supports(target) {
                    continue;
                }
                let p = preset(*kind, target, &config).expect("test: preset builds");
                assert_eq!(p.name(), format!("{kind}-{target}"));
                assert!(!p.scenario.stages().is_empty());
            }
        }
    }

    #[test]
    fn test_workload_shapes_reject_the_other_target() {
        let config = Config::default();
        for (kind, wrong) in [
            (ScenarioKind::PrefixCaching, Target::Embeddings),
            (ScenarioKind::PrefillHeavy, Target::Embeddings),
            (ScenarioKind::DecodeHeavy, Target::Embeddings),
            (ScenarioKind::BatchEmbeddings, Target::Completions),
        ] {
            let err = preset(kind, wrong, &config).unwrap_err();
            assert!(err.to_string().contains("only"), "{kind}: {err}");
        }
    }

    #[test]
    fn test_prefix_caching_uses_fim_and_coding_model() {
        let mut config = Config::default();
        config.workload.fim_max_tokens = 24;
        let p = preset(ScenarioKind::PrefixCaching, Target::Completions, &config).unwrap();
        assert_eq!(p.scenario.total_duration(), secs(120));
        assert_eq!(p.scenario.peak_concurrency(), 1);
        let Workload::Fim(fim) = p.workload else {
            panic!("expected a fill-in-the-middle workload");
        };
        assert_eq!(fim.max_tokens, 24);
        assert_eq!((fim.max_prefix_chars, fim.keep_chars), (2000, 500));
        assert_eq!(p.model(&config), "gpt-3.5-turbo");

        config.target.coding_model = Some("qwen-coder".into());
        assert_eq!(p.model(&config), "qwen-coder");
        let chat = preset(ScenarioKind::Load, Target::Completions, &config).unwrap();
        assert_eq!(chat.model(&config), "gpt-3.5-turbo");
    }

    #[test]
    fn test_prefill_heavy_records_prefill_time() {
        let p = preset(ScenarioKind::PrefillHeavy, Target::Completions, &Config::default()).unwrap();
        assert_eq!(p.scenario.total_duration(), secs(180));
        assert_eq!(p.scenario.peak_concurrency(), 2);
        assert_eq!(p.recording.latency_series, "prefill_processing_time");
        assert_eq!(p.failure_series, "failure_rate");
        assert!(matches!(p.workload, Workload::Prefill(w) if w.max_tokens == 150));
        assert!(p.plan().contains("prefill_processing_time p(95)<20000"));
    }

    #[test]
    fn test_decode_heavy_sizes_tokens_from_config() {
        let mut config = Config::default();
        let p = preset(ScenarioKind::DecodeHeavy, Target::Completions, &config).unwrap();
        assert_eq!(p.recording.latency_series, "output_generation_time");
        assert_eq!(p.pacing.backoff, secs(15));
        assert!(matches!(p.workload, Workload::Decode(w) if w.max_tokens.is_none()));
        assert!(p.plan().contains("token_generation_rate p(50)>5"));

        config.workload.max_output_tokens = Some(300);
        let p = preset(ScenarioKind::DecodeHeavy, Target::Completions, &config).unwrap();
        assert!(matches!(p.workload, Workload::Decode(w) if w.max_tokens == Some(300)));
    }

    #[test]
    fn test_batch_embeddings_cycles_batch_sizes() {
        let p = preset(ScenarioKind::BatchEmbeddings, Target::Embeddings, &Config::default())
            .unwrap();
        assert_eq!(p.scenario.total_duration(), secs(120));
        assert_eq!(p.recording.latency_series, "batch_embedding_latency");
        let Workload::Batch(batch) = p.workload else {
            panic!("expected a batch workload");
        };
        assert_eq!(batch.sizes, &[2, 3, 5]);
    }

    #[test]
    fn test_benchmark_holds_constant_worker_levels() {
        for (target, series) in [
            (Target::Completions, "completion_latency"),
            (Target::Embeddings, "embedding_latency"),
        ] {
            let p = preset(ScenarioKind::Benchmark, target, &Config::default()).unwrap();
            assert_eq!(p.scenario.ramp_mode(), RampMode::Jump);
            assert_eq!(p.scenario.target_concurrency(secs(0)), 1);
            assert_eq!(p.scenario.target_concurrency(secs(59)), 1);
            assert_eq!(p.scenario.target_concurrency(secs(60)), 2);
            assert_eq!(p.scenario.target_concurrency(secs(150)), 5);
            assert_eq!(p.scenario.total_duration(), secs(180));
            assert_eq!(p.recording.latency_series, series);
            assert!(p.recording.by_workers);
        }
    }

    #[test]
    fn test_recovery_completions_shape() {
        let p = preset(ScenarioKind::Recovery, Target::Completions, &Config::default()).unwrap();
        assert_eq!(p.scenario.total_duration(), secs(550));
        assert_eq!(p.scenario.peak_concurrency(), 20);
        let phases = p.phases.as_ref().unwrap();
        assert_eq!(phases.classify(secs(59)), Phase::Baseline);
        assert_eq!(phases.classify(secs(239)), Phase::Stress);
        assert_eq!(phases.classify(secs(240)), Phase::Recovery);
        assert_eq!(p.detector.unwrap().tolerance_factor, 1.2);
        assert_eq!(p.thresholds.len(), 2);
    }

    #[test]
    fn test_recovery_embeddings_uses_looser_tolerance() {
        let p = preset(ScenarioKind::Recovery, Target::Embeddings, &Config::default()).unwrap();
        assert_eq!(p.detector.unwrap().tolerance_factor, 1.3);
        assert_eq!(p.phases.unwrap().classify(secs(180)), Phase::Recovery);
    }

    #[test]
    fn test_smoke_is_three_iterations() {
        let p = preset(ScenarioKind::Smoke, Target::Embeddings, &Config::default()).unwrap();
        assert_eq!(p.max_iterations, Some(3));
        assert_eq!(p.executor_options(&Config::default()).max_iterations, Some(3));
    }

    #[test]
    fn test_load_follows_runs_config() {
        let mut config = Config::default();
        config.runs.vus = 8;
        config.runs.time_wait = Duration::ZERO;
        config.runs.time_ramp_up = secs(10);
        config.runs.time_load = secs(20);
        config.runs.time_ramp_down = secs(10);
        let p = preset(ScenarioKind::Load, Target::Completions, &config).unwrap();
        assert_eq!(p.scenario.stages().len(), 3);
        assert_eq!(p.scenario.total_duration(), secs(40));
        assert_eq!(p.scenario.target_concurrency(secs(5)), 4);
        assert_eq!(p.scenario.target_concurrency(secs(20)), 8);
    }

    #[test]
    fn test_load_with_zero_ramp_jumps_to_vus() {
        let mut config = Config::default();
        config.runs.vus = 4;
        config.runs.time_ramp_up = Duration::ZERO;
        config.runs.time_load = secs(10);
        config.runs.time_ramp_down = Duration::ZERO;
        let p = preset(ScenarioKind::Load, Target::Embeddings, &config).unwrap();
        assert_eq!(p.scenario.target_concurrency(Duration::ZERO), 4);
        assert_eq!(p.recording.latency_series, "embedding_latency");
    }

    #[test]
    fn test_load_with_all_zero_timings_is_rejected() {
        let mut config = Config::default();
        config.runs.time_ramp_up = Duration::ZERO;
        config.runs.time_load = Duration::ZERO;
        config.runs.time_ramp_down = Duration::ZERO;
        assert!(preset(ScenarioKind::Load, Target::Completions, &config).is_err());
    }

    #[test]
    fn test_spike_reports_failure_rate() {
        let p = preset(ScenarioKind::Spike, Target::Completions, &Config::default()).unwrap();
        assert_eq!(p.failure_series, "failure_rate");
        assert_eq!(p.phases.unwrap().classify(secs(99)), Phase::Stress);
    }

    #[test]
    fn test_plan_lists_stages_and_phases() {
        let p = preset(ScenarioKind::Recovery, Target::Completions, &Config::default()).unwrap();
        let plan = p.plan();
        assert!(plan.starts_with("recovery-completions"));
        assert!(plan.contains("-> 20 workers"));
        assert!(plan.contains("recovery"));
        assert!(plan.contains("stabilization_time avg<60000"));
    }

    #[test]
    fn test_detector_only_for_recovery_patterns() {
        let sink = Arc::new(MetricSink::new());
        let smoke = preset(ScenarioKind::Smoke, Target::Completions, &Config::default()).unwrap();
        assert!(smoke.detector(&sink).unwrap().is_none());
        let spike = preset(ScenarioKind::Spike, Target::Embeddings, &Config::default()).unwrap();
        assert!(spike.detector(&sink).unwrap().is_some());
    }
}
