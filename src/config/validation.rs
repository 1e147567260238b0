//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`Config`] that cannot be
//! expressed through the type system alone (non-empty identifiers, non-zero
//! timings, a load pattern that actually runs workers).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - Stage and phase boundaries of presets (checked when a `Scenario` or
//!   `PhaseClassifier` is built)

use super::duration::format_duration;
use super::Config;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "runs.vus").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// A duration string is not valid k6 time notation.
    #[error("Invalid duration {value:?}: {reason}")]
    InvalidDuration {
        /// The rejected input.
        value: String,
        /// What is wrong with it.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Validate all semantic constraints on a [`Config`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Target ───────────────────────────────────────────────────────
    let base_url = config.target.base_url.trim();
    if base_url.is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "target.base_url".into(),
            value: String::new(),
            reason: "base URL must not be empty".into(),
        });
    } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::InvalidField {
            field: "target.base_url".into(),
            value: base_url.to_string(),
            reason: "must start with http:// or https://".into(),
        });
    }

    if config.target.completion_model.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "target.completion_model".into(),
            value: String::new(),
            reason: "model name must not be empty".into(),
        });
    }

    if config.target.embedding_model.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "target.embedding_model".into(),
            value: String::new(),
            reason: "model name must not be empty".into(),
        });
    }

    if let Some(model) = &config.target.coding_model {
        if model.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: "target.coding_model".into(),
                value: String::new(),
                reason: "model name must not be empty; omit it to use completion_model".into(),
            });
        }
    }

    if config.target.request_timeout.is_zero() {
        errors.push(ConfigError::InvalidField {
            field: "target.request_timeout".into(),
            value: "0s".into(),
            reason: "timeout must be greater than zero".into(),
        });
    }

    // ── Load pattern ─────────────────────────────────────────────────
    let runs = &config.runs;
    if runs.vus == 0 && !runs.time_load.is_zero() {
        errors.push(ConfigError::InvalidField {
            field: "runs.vus".into(),
            value: "0".into(),
            reason: format!(
                "a {} hold at zero workers sends no traffic",
                format_duration(runs.time_load)
            ),
        });
    }

    if runs.time_ramp_up.is_zero() && runs.time_load.is_zero() && runs.time_ramp_down.is_zero() {
        errors.push(ConfigError::InvalidField {
            field: "runs".into(),
            value: "0s".into(),
            reason: "at least one of time_ramp_up, time_load, time_ramp_down must be non-zero"
                .into(),
        });
    }

    // ── Workload ─────────────────────────────────────────────────────
    if config.workload.fim_max_tokens == 0 {
        errors.push(ConfigError::InvalidField {
            field: "workload.fim_max_tokens".into(),
            value: "0".into(),
            reason: "must request at least one token".into(),
        });
    }

    if config.workload.max_output_tokens == Some(0) {
        errors.push(ConfigError::InvalidField {
            field: "workload.max_output_tokens".into(),
            value: "0".into(),
            reason: "must request at least one token; omit it to size by prompt".into(),
        });
    }

    // ── Executor ─────────────────────────────────────────────────────
    if config.executor.control_interval.is_zero() {
        errors.push(ConfigError::InvalidField {
            field: "executor.control_interval".into(),
            value: "0s".into(),
            reason: "control interval must be greater than zero".into(),
        });
    }

    if let Some(deadline) = config.executor.deadline {
        if deadline.is_zero() {
            errors.push(ConfigError::InvalidField {
                field: "executor.deadline".into(),
                value: "0s".into(),
                reason: "deadline must be greater than zero; omit it to disable".into(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Join a validation error list into a single [`ConfigError::Validation`].
pub fn collapse(errors: Vec<ConfigError>) -> ConfigError {
    ConfigError::Validation(
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn field_failed(errors: &[ConfigError], name: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidField { field, .. } if field == name))
    }

    #[test]
    fn test_validate_default_config_passes() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_empty_base_url_fails() {
        let mut config = Config::default();
        config.target.base_url = "  ".into();
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "target.base_url"));
    }

    #[test]
    fn test_validate_base_url_without_scheme_fails() {
        let mut config = Config::default();
        config.target.base_url = "localhost:8000".into();
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "target.base_url"));
    }

    #[test]
    fn test_validate_empty_models_fail() {
        let mut config = Config::default();
        config.target.completion_model = String::new();
        config.target.embedding_model = String::new();
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "target.completion_model"));
        assert!(field_failed(&errors, "target.embedding_model"));
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = Config::default();
        config.target.request_timeout = Duration::ZERO;
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "target.request_timeout"));
    }

    #[test]
    fn test_validate_zero_vus_with_hold_fails() {
        let mut config = Config::default();
        config.runs.vus = 0;
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "runs.vus"));
    }

    #[test]
    fn test_validate_zero_vus_without_hold_passes() {
        let mut config = Config::default();
        config.runs.vus = 0;
        config.runs.time_load = Duration::ZERO;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_all_zero_load_pattern_fails() {
        let mut config = Config::default();
        config.runs.time_ramp_up = Duration::ZERO;
        config.runs.time_load = Duration::ZERO;
        config.runs.time_ramp_down = Duration::ZERO;
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "runs"));
    }

    #[test]
    fn test_validate_zero_control_interval_fails() {
        let mut config = Config::default();
        config.executor.control_interval = Duration::ZERO;
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "executor.control_interval"));
    }

    #[test]
    fn test_validate_zero_deadline_fails() {
        let mut config = Config::default();
        config.executor.deadline = Some(Duration::ZERO);
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "executor.deadline"));
    }

    #[test]
    fn test_validate_zero_token_budgets_fail() {
        let mut config = Config::default();
        config.workload.fim_max_tokens = 0;
        config.workload.max_output_tokens = Some(0);
        config.target.coding_model = Some(" ".into());
        let errors = validate(&config).unwrap_err();
        assert!(field_failed(&errors, "workload.fim_max_tokens"));
        assert!(field_failed(&errors, "workload.max_output_tokens"));
        assert!(field_failed(&errors, "target.coding_model"));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.target.base_url = String::new();
        config.target.request_timeout = Duration::ZERO;
        config.executor.control_interval = Duration::ZERO;
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3, "expected 3 errors, got {errors:?}");
    }

    #[test]
    fn test_invalid_field_display_includes_path_and_reason() {
        let err = ConfigError::InvalidField {
            field: "runs.vus".into(),
            value: "0".into(),
            reason: "must be positive".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("runs.vus"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_collapse_joins_messages() {
        let err = collapse(vec![
            ConfigError::Validation("first".into()),
            ConfigError::Validation("second".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("first") && msg.contains("second"));
    }
}
