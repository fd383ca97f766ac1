//! Typed access to untyped legacy records.
//!
//! Legacy files were written by hand and by several app versions, so a field
//! may carry a number where a string is expected, a date in one of several
//! formats, or nothing at all. These helpers coerce what can be coerced and
//! return `None` for the rest; entity transforms pick the defaults.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// One record of a legacy collection, exactly as read from disk.
pub type LegacyRecord = Map<String, Value>;

/// First non-empty string among the given keys. Numbers are stringified.
pub fn text(raw: &LegacyRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match raw.get(*key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Boolean flag; accepts `true`/`false`, `"true"`/`"false"`/`"yes"`/`"no"` and `0`/`1`.
pub fn flag(raw: &LegacyRecord, key: &str) -> Option<bool> {
    match raw.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Number; accepts JSON numbers and numeric strings such as `"250,000"`.
pub fn number(raw: &LegacyRecord, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, ',' | '$' | ' '))
                .collect();
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Timestamp in epoch milliseconds.
///
/// Accepts RFC 3339 strings, naive `YYYY-MM-DD[ T]HH:MM:SS[.fff]` and
/// `YYYY-MM-DD` strings (read as UTC), and integer epoch milliseconds.
pub fn timestamp(raw: &LegacyRecord, key: &str) -> Option<i64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_timestamp(s.trim()),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().timestamp_millis());
    }
    s.parse::<i64>().ok()
}

/// Sequence field carried through unchanged; anything else becomes empty.
pub fn sequence(raw: &LegacyRecord, key: &str) -> Vec<Value> {
    match raw.get(key) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Nested object field.
pub fn object<'a>(raw: &'a LegacyRecord, key: &str) -> Option<&'a LegacyRecord> {
    raw.get(key).and_then(Value::as_object)
}

/// Normalized email: trimmed, lower-cased, must contain `@`.
pub fn email(raw: &LegacyRecord) -> Option<String> {
    text(raw, &["email"])
        .map(|e| e.to_lowercase())
        .filter(|e| e.contains('@'))
}

/// Legacy identifier, used for provenance.
pub fn legacy_id(raw: &LegacyRecord) -> Option<String> {
    text(raw, &["id", "_id"])
}

/// Best human-readable key for log lines about a record.
pub fn describe(raw: &LegacyRecord) -> String {
    text(raw, &["email"])
        .or_else(|| legacy_id(raw).map(|id| format!("id:{}", id)))
        .unwrap_or_else(|| "<unidentified>".to_string())
}
