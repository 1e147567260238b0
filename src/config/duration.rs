//! k6 time notation.
//!
//! Durations in config files and env vars are written the way load-testing
//! scripts write them: a sequence of `<number><unit>` parts such as `"1m30s"`,
//! `"500ms"` or `"1.5h"`. Units are `h`, `m`, `s`, `ms` and `us`. A bare number
//! is taken as milliseconds.

use super::validation::ConfigError;
use std::time::Duration;

fn invalid(value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidDuration {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn unit_millis(unit: &str) -> Option<f64> {
    match unit {
        "h" => Some(3_600_000.0),
        "m" => Some(60_000.0),
        "s" => Some(1_000.0),
        "ms" => Some(1.0),
        "us" | "µs" => Some(0.001),
        _ => None,
    }
}

/// Parse a k6 duration string.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] for empty input, unknown units,
/// negative values, or a number without a unit in a multi-part string.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tokio_prompt_loadtest::config::duration::parse_duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(invalid(input, "empty duration"));
    }

    if let Ok(ms) = raw.parse::<f64>() {
        if !ms.is_finite() || ms < 0.0 {
            return Err(invalid(input, "must be a non-negative number"));
        }
        return to_duration(input, ms);
    }

    let mut total_ms = 0.0_f64;
    let mut rest = raw;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(invalid(input, "expected a number"));
        }
        let (num, tail) = rest.split_at(num_len);
        let value: f64 = num
            .parse()
            .map_err(|_| invalid(input, "malformed number"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        if unit_len == 0 {
            return Err(invalid(input, "missing unit"));
        }
        let (unit, next) = tail.split_at(unit_len);
        let factor = unit_millis(unit).ok_or_else(|| invalid(input, "unknown unit"))?;

        total_ms += value * factor;
        rest = next;
    }

    to_duration(input, total_ms)
}

fn to_duration(input: &str, ms: f64) -> Result<Duration, ConfigError> {
    let nanos = (ms * 1_000_000.0).round();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(invalid(input, "out of range"));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Render a duration in k6 notation, largest unit first.
///
/// Sub-millisecond precision is dropped. Zero renders as `"0s"`.
pub fn format_duration(d: Duration) -> String {
    let mut ms = d.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size) in [("h", 3_600_000u128), ("m", 60_000), ("s", 1_000), ("ms", 1)] {
        let n = ms / size;
        if n > 0 {
            out.push_str(&n.to_string());
            out.push_str(unit);
            ms -= n * size;
        }
    }
    out
}

/// `#[serde(with = "duration::k6")]` for `Duration` fields.
pub mod k6 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as a k6 duration string.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    /// Deserialize from a k6 duration string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(default, with = "duration::k6_option")]` for `Option<Duration>` fields.
pub mod k6_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize `Some` as a k6 duration string and `None` as unit.
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&super::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional k6 duration string.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| super::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_compound_duration() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(
            parse_duration("1h2m3s").unwrap(),
            Duration::from_secs(3600 + 120 + 3)
        );
    }

    #[test]
    fn test_parse_fractional_value() {
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_bare_number_is_milliseconds() {
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "  ", "abc", "10x", "1m30", "-5s", "s"] {
            let err = parse_duration(bad).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidDuration { .. }),
                "{bad:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_format_largest_unit_first() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_format_then_parse_preserves_millisecond_values() {
        let d = Duration::from_millis(3_723_004);
        assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
    }
}
