//! Timestamp normalization.
//!
//! Legacy data mixes ISO-8601 strings, SQL-style space separated strings and
//! extended-JSON `{"$date": ...}` wrappers. Everything that parses is rendered
//! in UTC using [`CANONICAL_FORMAT`]; anything else becomes an empty string so
//! the record store can assign its own time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Output format for every normalized timestamp.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Formats carrying an explicit offset.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Formats without an offset; all are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S%.f UTC",
    "%Y-%m-%d %H:%M:%S UTC",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a raw timestamp, trying every known format in a fixed order.
#[must_use]
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with('{') {
        let value: Value = serde_json::from_str(raw).ok()?;
        return parse_value(&value);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parse a JSON value that may be a plain string or an extended-JSON date.
///
/// `{"$date": ...}` may wrap a string, epoch milliseconds, or a
/// `{"$numberLong": "..."}` holding epoch milliseconds.
#[must_use]
pub fn parse_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse(s),
        Value::Object(map) => match map.get("$date")? {
            Value::Number(n) => n.as_i64().and_then(from_millis),
            Value::Object(inner) => inner
                .get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|s| s.trim().parse::<i64>().ok())
                .and_then(from_millis),
            other => parse_value(other),
        },
        _ => None,
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Render a UTC time in the canonical format.
#[must_use]
pub fn format(dt: &DateTime<Utc>) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

/// Normalize a raw timestamp string.
///
/// Returns an empty string when nothing matches.
#[must_use]
pub fn normalize(raw: &str) -> String {
    parse(raw).map(|dt| format(&dt)).unwrap_or_default()
}

/// Normalize a JSON value (string or extended-JSON wrapper).
#[must_use]
pub fn normalize_value(value: &Value) -> String {
    parse_value(value).map(|dt| format(&dt)).unwrap_or_default()
}

/// The current time in the canonical format.
#[must_use]
pub fn now() -> String {
    format(&Utc::now())
}
