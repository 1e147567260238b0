//! # Harness Configuration
//!
//! ## Responsibility
//! Describe everything a run needs from the outside world: where the API
//! lives, which models to hit, the VU count and stage timings of the `load`
//! pattern, executor pacing, and observability switches.
//!
//! ```text
//! loadtest run --scenario recovery --target completions --config harness.toml
//! ```
//!
//! ## Guarantees
//! - Every field has a documented default, so an empty TOML file is a valid config
//! - Durations use k6 time notation (`"1m30s"`, `"500ms"`) in files and env vars
//! - Validated: semantic constraints are checked before a config is accepted
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building stage lists from the `runs` section (that belongs to `scenarios`)
//! - Reading the process environment from inside the core; the binary calls
//!   [`loader::apply_env_overrides`] once at startup and passes the result down

pub mod duration;
pub mod loader;
pub mod validation;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ── Default value functions ──────────────────────────────────────────────

/// Default API base URL.
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

/// Default completion model.
fn default_completion_model() -> String {
    "gpt-3.5-turbo".to_string()
}

/// Default embedding model.
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Default `max_tokens` for fill-in-the-middle requests.
fn default_fim_max_tokens() -> u64 {
    16
}

/// Default per-request timeout: 60s.
fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Default VU count for the `load` pattern.
fn default_vus() -> u32 {
    1
}

fn default_time_wait() -> Duration {
    Duration::ZERO
}

fn default_time_ramp_up() -> Duration {
    Duration::from_secs(30)
}

fn default_time_load() -> Duration {
    Duration::from_secs(60)
}

fn default_time_ramp_down() -> Duration {
    Duration::from_secs(30)
}

/// Default executor control-loop interval: 100ms.
fn default_control_interval() -> Duration {
    Duration::from_millis(100)
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a harness run.
///
/// Deserialized from a TOML file (or built from defaults), overlaid with
/// environment overrides, and validated before use.
///
/// # Example
///
/// ```toml
/// [target]
/// base_url = "http://localhost:8000"
/// completion_model = "llama-3-8b"
///
/// [runs]
/// vus = 8
/// time_load = "5m"
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Config {
    /// API endpoint, credentials and model identifiers.
    #[serde(default)]
    pub target: TargetConfig,
    /// VU count and stage timings for the `load` pattern.
    #[serde(default)]
    pub runs: RunsConfig,
    /// Executor pacing and hard deadline.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Token budgets for the workload-shape presets.
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Logging and metrics output.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Target ───────────────────────────────────────────────────────────────

/// The API under test.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TargetConfig {
    /// Base URL without a trailing path (e.g., "https://api.openai.com").
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent in the `Authorization` header. Empty sends an empty token.
    #[serde(default)]
    pub api_key: String,
    /// Model used by completion and chat-completion presets.
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    /// Model used by embedding presets.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Model for the fill-in-the-middle preset; `None` uses `completion_model`.
    #[serde(default)]
    pub coding_model: Option<String>,
    /// Per-request timeout enforced by the HTTP transport.
    #[serde(default = "default_request_timeout", with = "duration::k6")]
    #[schemars(with = "String")]
    pub request_timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            completion_model: default_completion_model(),
            embedding_model: default_embedding_model(),
            coding_model: None,
            request_timeout: default_request_timeout(),
        }
    }
}

// ── Runs ─────────────────────────────────────────────────────────────────

/// Stage timings for the `load` pattern: wait, ramp up, hold, ramp down.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RunsConfig {
    /// Peak number of virtual workers.
    #[serde(default = "default_vus")]
    pub vus: u32,
    /// Idle time at zero workers before ramping up.
    #[serde(default = "default_time_wait", with = "duration::k6")]
    #[schemars(with = "String")]
    pub time_wait: Duration,
    /// Linear ramp from 0 to `vus`.
    #[serde(default = "default_time_ramp_up", with = "duration::k6")]
    #[schemars(with = "String")]
    pub time_ramp_up: Duration,
    /// Hold at `vus`.
    #[serde(default = "default_time_load", with = "duration::k6")]
    #[schemars(with = "String")]
    pub time_load: Duration,
    /// Linear ramp from `vus` back to 0.
    #[serde(default = "default_time_ramp_down", with = "duration::k6")]
    #[schemars(with = "String")]
    pub time_ramp_down: Duration,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            vus: default_vus(),
            time_wait: default_time_wait(),
            time_ramp_up: default_time_ramp_up(),
            time_load: default_time_load(),
            time_ramp_down: default_time_ramp_down(),
        }
    }
}

// ── Executor ─────────────────────────────────────────────────────────────

/// Executor pacing.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExecutorConfig {
    /// How often the controller re-samples the target concurrency.
    #[serde(default = "default_control_interval", with = "duration::k6")]
    #[schemars(with = "String")]
    pub control_interval: Duration,
    /// Hard wall-clock budget. `None` runs until the scenario ends.
    #[serde(default, with = "duration::k6_option")]
    #[schemars(with = "Option<String>")]
    pub deadline: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            control_interval: default_control_interval(),
            deadline: None,
        }
    }
}

// ── Workload ─────────────────────────────────────────────────────────────

/// Token budgets for `prefix_caching` and `decode_heavy`.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// `max_tokens` of each fill-in-the-middle request.
    #[serde(default = "default_fim_max_tokens")]
    pub fim_max_tokens: u64,
    /// Fixed `max_tokens` for decode-heavy requests. `None` sizes each
    /// request by how long an answer its prompt asks for.
    #[serde(default)]
    pub max_output_tokens: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            fim_max_tokens: default_fim_max_tokens(),
            max_output_tokens: None,
        }
    }
}

// ── Observability ────────────────────────────────────────────────────────

/// Observability configuration: log format, request debugging, metrics dump.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservabilityConfig {
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Log method, URL and status of every request at `debug` level.
    #[serde(default)]
    pub network_debug: bool,
    /// Write the Prometheus text exposition here at end of run. `None` disables it.
    #[serde(default)]
    pub prometheus_out: Option<PathBuf>,
}

/// Log output format.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized log output.
    #[default]
    Pretty,
    /// Structured JSON log output for machine consumption.
    Json,
}

impl FromStr for LogFormat {
    type Err = validation::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(validation::ConfigError::InvalidField {
                field: "observability.log_format".into(),
                value: other.to_string(),
                reason: "expected \"pretty\" or \"json\"".into(),
            }),
        }
    }
}

/// Export the JSON Schema for [`Config`].
///
/// This enables IDE autocomplete when editing TOML config files.
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails (should not
/// happen with well-formed derive macros).
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(Config);
    serde_json::to_string_pretty(&schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target_points_at_openai() {
        let target = TargetConfig::default();
        assert_eq!(target.base_url, "https://api.openai.com");
        assert_eq!(target.completion_model, "gpt-3.5-turbo");
        assert_eq!(target.embedding_model, "text-embedding-3-small");
        assert!(target.api_key.is_empty());
        assert!(target.coding_model.is_none());
    }

    #[test]
    fn test_workload_section_defaults_and_overrides() {
        assert_eq!(WorkloadConfig::default().fim_max_tokens, 16);
        let config: Config = toml::from_str(
            r#"
[workload]
max_output_tokens = 600
"#,
        )
        .expect("test: workload toml");
        assert_eq!(config.workload.fim_max_tokens, 16);
        assert_eq!(config.workload.max_output_tokens, Some(600));
    }

    #[test]
    fn test_default_runs_match_load_pattern_defaults() {
        let runs = RunsConfig::default();
        assert_eq!(runs.vus, 1);
        assert_eq!(runs.time_wait, Duration::ZERO);
        assert_eq!(runs.time_ramp_up, Duration::from_secs(30));
        assert_eq!(runs.time_load, Duration::from_secs(60));
        assert_eq!(runs.time_ramp_down, Duration::from_secs(30));
    }

    #[test]
    fn test_default_control_interval_returns_100ms() {
        assert_eq!(default_control_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_empty_toml_yields_default_config() {
        let config: Config = toml::from_str("").expect("test: empty toml");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_durations_deserialize_from_k6_notation() {
        let config: Config = toml::from_str(
            r#"
[runs]
time_load = "1m30s"
time_ramp_up = "500ms"

[executor]
deadline = "10m"
"#,
        )
        .expect("test: parse");
        assert_eq!(config.runs.time_load, Duration::from_secs(90));
        assert_eq!(config.runs.time_ramp_up, Duration::from_millis(500));
        assert_eq!(config.executor.deadline, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_config_serializes_durations_back_to_k6_notation() {
        let config = Config::default();
        let text = toml::to_string(&config).expect("test: serialize");
        assert!(text.contains("time_load = \"1m\""), "got: {text}");
        assert!(text.contains("control_interval = \"100ms\""), "got: {text}");
    }

    #[test]
    fn test_log_format_serializes_to_snake_case() {
        let json = serde_json::to_string(&LogFormat::Pretty).expect("test: serialization");
        assert_eq!(json, "\"pretty\"");
    }

    #[test]
    fn test_log_format_from_str_is_case_insensitive() {
        assert_eq!("JSON".parse::<LogFormat>().expect("test: parse"), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_export_schema_produces_valid_json() {
        let schema = export_schema().expect("test: schema export");
        let parsed: serde_json::Value =
            serde_json::from_str(&schema).expect("test: schema is valid JSON");
        assert!(parsed.get("properties").is_some() || parsed.get("$ref").is_some());
    }
}
