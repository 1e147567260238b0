//! Configuration loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into a [`Config`], and run
//! validation before returning. Also overlays the environment variables the
//! harness has always honoured (`OPENAI_BASE_URL`, `VUS`, `TIME_LOAD`, ...)
//! onto an already-built config.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//! - Environment lookup goes through a caller-supplied function, so the core
//!   never reads process state on its own

use std::path::Path;

use super::duration::parse_duration;
use super::validation::{self, ConfigError};
use super::{Config, LogFormat};

/// Load a [`Config`] from a TOML file.
///
/// # Returns
///
/// - `Ok(Config)` if the file is readable, well-formed, and valid.
/// - `Err(ConfigError::Io)` if the file cannot be read.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_prompt_loadtest::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("harness.toml"))?;
/// println!("Target: {}", config.target.base_url);
/// ```
pub fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`Config`] from a TOML string.
///
/// `source_name` identifies the source in error messages.
///
/// # Errors
///
/// - `ConfigError::Parse` if the TOML is malformed.
/// - `ConfigError::Validation` if semantic constraints are violated.
pub fn load_from_str(content: &str, source_name: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(validation::collapse)?;

    Ok(config)
}

/// Overlay process environment variables onto `config`.
///
/// Thin wrapper over [`apply_overrides_from`] reading `std::env`. Call this
/// once at startup, then re-validate.
///
/// # Errors
///
/// See [`apply_overrides_from`].
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Overlay overrides from an arbitrary lookup function onto `config`.
///
/// | Variable | Field |
/// |---|---|
/// | `OPENAI_BASE_URL` | `target.base_url` |
/// | `OPENAI_API_KEY` | `target.api_key` |
/// | `OPENAI_COMPLETION_MODEL` | `target.completion_model` |
/// | `OPENAI_EMBEDDING_MODEL` | `target.embedding_model` |
/// | `OPENAI_CODING_MODEL` | `target.coding_model` |
/// | `MAX_TOKENS` | `workload.fim_max_tokens` (non-numeric values are ignored) |
/// | `MAX_OUTPUT_TOKENS` | `workload.max_output_tokens` (non-numeric values are ignored) |
/// | `VUS` | `runs.vus` (non-numeric values are ignored) |
/// | `TIME_WAIT`, `TIME_RAMP_UP`, `TIME_LOAD`, `TIME_RAMP_DOWN` | `runs.*` |
/// | `LOG_FORMAT` | `observability.log_format` |
/// | `NETWORK_DEBUG` | `observability.network_debug` (`"true"` enables) |
///
/// Empty values are treated as unset.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] for a malformed `TIME_*` value
/// and [`ConfigError::InvalidField`] for an unknown `LOG_FORMAT`.
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("OPENAI_BASE_URL") {
        config.target.base_url = v;
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        config.target.api_key = v;
    }
    if let Some(v) = get("OPENAI_COMPLETION_MODEL") {
        config.target.completion_model = v;
    }
    if let Some(v) = get("OPENAI_EMBEDDING_MODEL") {
        config.target.embedding_model = v;
    }

    if let Some(v) = get("OPENAI_CODING_MODEL") {
        config.target.coding_model = Some(v);
    }

    if let Some(v) = get("MAX_TOKENS") {
        match v.trim().parse::<u64>() {
            Ok(n) => config.workload.fim_max_tokens = n,
            Err(_) => tracing::warn!(value = %v, "ignoring non-numeric MAX_TOKENS override"),
        }
    }
    if let Some(v) = get("MAX_OUTPUT_TOKENS") {
        match v.trim().parse::<u64>() {
            Ok(n) => config.workload.max_output_tokens = Some(n),
            Err(_) => tracing::warn!(value = %v, "ignoring non-numeric MAX_OUTPUT_TOKENS override"),
        }
    }

    if let Some(v) = get("VUS") {
        match v.trim().parse::<u32>() {
            Ok(vus) => config.runs.vus = vus,
            Err(_) => tracing::warn!(value = %v, "ignoring non-numeric VUS override"),
        }
    }

    if let Some(v) = get("TIME_WAIT") {
        config.runs.time_wait = parse_duration(&v)?;
    }
    if let Some(v) = get("TIME_RAMP_UP") {
        config.runs.time_ramp_up = parse_duration(&v)?;
    }
    if let Some(v) = get("TIME_LOAD") {
        config.runs.time_load = parse_duration(&v)?;
    }
    if let Some(v) = get("TIME_RAMP_DOWN") {
        config.runs.time_ramp_down = parse_duration(&v)?;
    }

    if let Some(v) = get("LOG_FORMAT") {
        config.observability.log_format = v.parse::<LogFormat>()?;
    }
    if let Some(v) = get("NETWORK_DEBUG") {
        config.observability.network_debug = v.trim() == "true";
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    const VALID_TOML: &str = r#"
[target]
base_url = "http://localhost:8000"
api_key = "sk-test"
completion_model = "llama-3-8b"

[runs]
vus = 4
time_load = "2m"

[executor]
control_interval = "50ms"

[observability]
log_format = "json"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "test").expect("test: valid config");
        assert_eq!(config.target.base_url, "http://localhost:8000");
        assert_eq!(config.runs.vus, 4);
        assert_eq!(config.runs.time_load, Duration::from_secs(120));
        assert_eq!(config.executor.control_interval, Duration::from_millis(50));
        assert_eq!(config.observability.log_format, LogFormat::Json);
        // untouched sections keep their defaults
        assert_eq!(config.target.embedding_model, "text-embedding-3-small");
    }

    #[test]
    fn test_load_from_str_invalid_toml_returns_parse_error() {
        let result = load_from_str("not valid toml [[[", "bad.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_str_bad_duration_returns_parse_error() {
        let result = load_from_str("[runs]\ntime_load = \"ten minutes\"\n", "dur.toml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("dur.toml"));
    }

    #[test]
    fn test_load_from_str_validation_failure_returns_validation_error() {
        let result = load_from_str("[target]\nbase_url = \"\"\n", "empty-url.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_from_file_valid_toml_succeeds() {
        let dir = tempfile::tempdir().expect("test: create tempdir");
        let path = dir.path().join("harness.toml");
        let mut f = std::fs::File::create(&path).expect("test: create file");
        f.write_all(VALID_TOML.as_bytes()).expect("test: write");
        drop(f);

        let config = load_from_file(&path).expect("test: load from file");
        assert_eq!(config.target.completion_model, "llama-3-8b");
    }

    #[test]
    fn test_load_from_file_missing_file_returns_io_error() {
        let result = load_from_file(Path::new("/nonexistent/path/harness.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::Io { .. }));
    }

    #[test]
    fn test_overrides_replace_target_and_runs() {
        let mut config = Config::default();
        apply_overrides_from(
            &mut config,
            env(&[
                ("OPENAI_BASE_URL", "http://127.0.0.1:9000"),
                ("OPENAI_API_KEY", "sk-env"),
                ("OPENAI_EMBEDDING_MODEL", "nomic-embed"),
                ("VUS", "12"),
                ("TIME_LOAD", "5m"),
                ("TIME_RAMP_DOWN", "10s"),
                ("NETWORK_DEBUG", "true"),
                ("LOG_FORMAT", "json"),
            ]),
        )
        .expect("test: overrides");

        assert_eq!(config.target.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.target.api_key, "sk-env");
        assert_eq!(config.target.embedding_model, "nomic-embed");
        assert_eq!(config.target.completion_model, "gpt-3.5-turbo");
        assert_eq!(config.runs.vus, 12);
        assert_eq!(config.runs.time_load, Duration::from_secs(300));
        assert_eq!(config.runs.time_ramp_down, Duration::from_secs(10));
        assert!(config.observability.network_debug);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_overrides_set_coding_model_and_token_budgets() {
        let mut config = Config::default();
        apply_overrides_from(
            &mut config,
            env(&[
                ("OPENAI_CODING_MODEL", "qwen-coder"),
                ("MAX_TOKENS", "32"),
                ("MAX_OUTPUT_TOKENS", "lots"),
            ]),
        )
        .expect("test: overrides");

        assert_eq!(config.target.coding_model.as_deref(), Some("qwen-coder"));
        assert_eq!(config.workload.fim_max_tokens, 32);
        assert_eq!(config.workload.max_output_tokens, None);
    }

    #[test]
    fn test_non_numeric_vus_keeps_default() {
        let mut config = Config::default();
        apply_overrides_from(&mut config, env(&[("VUS", "many")])).expect("test: overrides");
        assert_eq!(config.runs.vus, 1);
    }

    #[test]
    fn test_network_debug_requires_literal_true() {
        let mut config = Config::default();
        apply_overrides_from(&mut config, env(&[("NETWORK_DEBUG", "1")]))
            .expect("test: overrides");
        assert!(!config.observability.network_debug);
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let mut config = Config::default();
        apply_overrides_from(&mut config, env(&[("OPENAI_BASE_URL", "")]))
            .expect("test: overrides");
        assert_eq!(config.target.base_url, "https://api.openai.com");
    }

    #[test]
    fn test_malformed_time_override_returns_duration_error() {
        let mut config = Config::default();
        let err = apply_overrides_from(&mut config, env(&[("TIME_RAMP_UP", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { .. }));
    }

    #[test]
    fn test_unknown_log_format_override_fails() {
        let mut config = Config::default();
        let err =
            apply_overrides_from(&mut config, env(&[("LOG_FORMAT", "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { .. }));
    }
}
