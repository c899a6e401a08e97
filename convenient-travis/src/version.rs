//! Runtime version normalization
//!
//! Travis accepts `php: 7`, `php: 7.1`, `php: "7.1.2"` and `php: nightly`
//! interchangeably. Jobs are keyed and tagged by the normalized string, so
//! `7` and `7.0` must collapse to the same job.

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;

/// Normalize a runtime version token
///
/// - non-numeric tokens pass through (`nightly`, `hhvm`)
/// - numeric tokens with more than one `.` pass through (`7.1.2`)
/// - other numeric tokens get exactly one decimal place (`7` → `7.0`)
pub fn format_version(raw: &str) -> String {
    let token = raw.trim();
    if !is_numeric(token) {
        return raw.to_string();
    }

    if token.matches('.').count() > 1 {
        return raw.to_string();
    }

    match token.parse::<f64>() {
        Ok(value) => format!("{value:.1}"),
        Err(_) => raw.to_string(),
    }
}

/// Render a YAML scalar as a version token and normalize it
///
/// `None` for null or blank values, which callers treat as "any version".
pub fn version_from_value(value: &Value, key: &str) -> ConfigResult<Option<String>> {
    let raw = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                expected: "a version string or number",
            });
        }
    };

    if raw.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(format_version(&raw)))
}

/// Decimal numbers with an optional sign and exponent
fn is_numeric(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }

    let body = token.strip_prefix(['+', '-']).unwrap_or(token);
    let (mantissa, exponent) = match body.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (body, None),
    };

    let digits_ok = mantissa.chars().any(|c| c.is_ascii_digit())
        && mantissa.chars().all(|c| c.is_ascii_digit() || c == '.');

    let exponent_ok = exponent.is_none_or(|e| {
        let e = e.strip_prefix(['+', '-']).unwrap_or(e);
        !e.is_empty() && e.chars().all(|c| c.is_ascii_digit())
    });

    digits_ok && exponent_ok
}
