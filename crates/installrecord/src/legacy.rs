//! Legacy source API and record conversion.
//!
//! Legacy records come from a document store and arrive with extended-JSON
//! wrappers (`{"$numberInt": "8"}`, `{"$date": ...}`, `{"$oid": ...}`) mixed
//! with plain scalars. Extraction is best effort: a field that cannot be
//! read falls back to its default instead of rejecting the record.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::warn;

use crate::backend::{classify_response, BackendError};
use crate::error::{Error, Result};
use crate::record::{RecordType, Status, TelemetryRecord};
use crate::timestamp;

/// Keys of single-key extended-JSON scalar wrappers.
const WRAPPER_KEYS: &[&str] = &[
    "$numberInt",
    "$numberLong",
    "$numberDouble",
    "$numberDecimal",
    "$oid",
    "$string",
];

fn leading_digits_re() -> &'static Regex {
    static LEADING_DIGITS: OnceLock<Regex> = OnceLock::new();
    LEADING_DIGITS.get_or_init(|| Regex::new(r"^\s*(\d+)").expect("valid leading digits regex"))
}

/// Read access to the legacy API.
pub trait LegacySource {
    /// Base URL (or other description) of the source, for messages.
    fn base_url(&self) -> &str;

    /// Total number of records available.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary cannot be fetched or decoded.
    fn total_entries(&self) -> std::result::Result<u64, BackendError>;

    /// Fetch one page (1-based) of raw records.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be fetched or decoded.
    fn fetch_page(&self, page: u32, limit: u32) -> std::result::Result<Vec<Value>, BackendError>;
}

/// [`LegacySource`] over HTTP.
#[derive(Debug)]
pub struct HttpLegacySource {
    base_url: String,
    http: Client,
}

impl HttpLegacySource {
    /// Create a source for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn get_json(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> std::result::Result<Value, BackendError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        classify_response(status, &body)?;
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

impl LegacySource for HttpLegacySource {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn total_entries(&self) -> std::result::Result<u64, BackendError> {
        let summary = self.get_json(format!("{}/summary", self.base_url), &[])?;
        summary
            .get("total_entries")
            .and_then(as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| BackendError::Decode("summary lacks total_entries".to_string()))
    }

    fn fetch_page(&self, page: u32, limit: u32) -> std::result::Result<Vec<Value>, BackendError> {
        let body = self.get_json(
            format!("{}/paginated", self.base_url),
            &[("page", page.to_string()), ("limit", limit.to_string())],
        )?;
        match body {
            Value::Array(records) => Ok(records),
            other => Err(BackendError::Decode(format!(
                "expected an array of records, got {}",
                kind(&other)
            ))),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strip a single-key extended-JSON scalar wrapper, if present.
#[must_use]
pub fn unwrap_extended(value: &Value) -> &Value {
    if let Value::Object(map) = value {
        if map.len() == 1 {
            if let Some((key, inner)) = map.iter().next() {
                if WRAPPER_KEYS.contains(&key.as_str()) {
                    return unwrap_extended(inner);
                }
            }
        }
    }
    value
}

/// Read a value as an integer.
///
/// Accepts numbers (floats are truncated), numeric strings and wrapped
/// numbers.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn as_i64(value: &Value) -> Option<i64> {
    match unwrap_extended(value) {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

/// Read a value as a non-empty string.
#[must_use]
pub fn as_string(value: &Value) -> Option<String> {
    match unwrap_extended(value) {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a size that may carry a unit suffix, keeping the integer part.
///
/// `"20G"` and `20` both yield `20`.
#[must_use]
pub fn strip_unit(value: &Value) -> Option<u64> {
    match unwrap_extended(value) {
        Value::String(s) => leading_digits_re()
            .captures(s)
            .and_then(|caps| caps[1].parse().ok()),
        other => as_i64(other).and_then(|n| u64::try_from(n).ok()),
    }
}

/// Collapse a legacy class code to `0` or `1`.
///
/// `0` (and anything unreadable or negative) stays `0`; every value of `1`
/// or more becomes `1`.
#[must_use]
pub fn normalize_ct_type(value: Option<&Value>) -> u8 {
    match value.and_then(as_i64) {
        Some(n) if n >= 1 => 1,
        _ => 0,
    }
}

fn text(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(as_string)
}

/// Creation time of a legacy record, if readable.
#[must_use]
pub fn created_time(record: &Value) -> Option<DateTime<Utc>> {
    ["created_at", "created", "timestamp"]
        .iter()
        .filter_map(|key| record.get(*key))
        .find_map(timestamp::parse_value)
}

/// Creation time of a legacy record in canonical form, if readable.
#[must_use]
pub fn created_at(record: &Value) -> Option<String> {
    created_time(record).map(|dt| timestamp::format(&dt))
}

/// Convert one legacy record.
///
/// The legacy creation time, when readable, is placed in `created`; callers
/// decide whether it stays there or moves to the shadow field. Returns `None`
/// only when no session token (`random_id`, or the document id as a fallback)
/// can be found.
#[must_use]
pub fn convert(record: &Value) -> Option<TelemetryRecord> {
    let Some(random_id) = text(record, "random_id").or_else(|| text(record, "_id")) else {
        warn!("Legacy record without random_id or _id, cannot import");
        return None;
    };

    let record_type = text(record, "type")
        .and_then(|t| t.parse::<RecordType>().ok())
        .unwrap_or_default();
    let status = text(record, "status").map_or(Status::Unknown, |s| Status::from_legacy(&s));
    let (error, exit_code) = if status == Status::Success {
        (String::new(), 0)
    } else {
        let exit_code = record
            .get("exit_code")
            .and_then(as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(0);
        (text(record, "error").unwrap_or_default(), exit_code)
    };

    Some(TelemetryRecord {
        id: None,
        random_id,
        record_type,
        ct_type: normalize_ct_type(record.get("ct_type")),
        nsapp: text(record, "nsapp").unwrap_or_default(),
        method: text(record, "method"),
        os_type: text(record, "os_type"),
        os_version: text(record, "os_version"),
        pve_version: text(record, "pve_version"),
        disk_size: record.get("disk_size").and_then(strip_unit),
        core_count: record.get("core_count").and_then(strip_unit),
        ram_size: record.get("ram_size").and_then(strip_unit),
        status,
        error,
        exit_code,
        repo_source: None,
        created: created_at(record),
        updated: None,
        original_created: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_extended() {
        assert_eq!(unwrap_extended(&json!({"$numberInt": "8"})), &json!("8"));
        assert_eq!(unwrap_extended(&json!({"$oid": "abc"})), &json!("abc"));
        assert_eq!(unwrap_extended(&json!(8)), &json!(8));
        let two_keys = json!({"$numberInt": "8", "x": 1});
        assert_eq!(unwrap_extended(&two_keys), &two_keys);
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(as_i64(&json!(8)), Some(8));
        assert_eq!(as_i64(&json!(8.9)), Some(8));
        assert_eq!(as_i64(&json!("12")), Some(12));
        assert_eq!(as_i64(&json!({"$numberLong": "4096"})), Some(4096));
        assert_eq!(as_i64(&json!({"$numberDouble": "2.5"})), Some(2));
        assert_eq!(as_i64(&json!("abc")), None);
        assert_eq!(as_i64(&Value::Null), None);
    }

    #[test]
    fn test_strip_unit() {
        assert_eq!(strip_unit(&json!("20G")), Some(20));
        assert_eq!(strip_unit(&json!(8)), Some(8));
        assert_eq!(strip_unit(&json!(" 32 GB")), Some(32));
        assert_eq!(strip_unit(&json!({"$numberInt": "4"})), Some(4));
        assert_eq!(strip_unit(&json!("G")), None);
        assert_eq!(strip_unit(&json!(-3)), None);
    }

    #[test]
    fn test_normalize_ct_type() {
        assert_eq!(normalize_ct_type(Some(&json!(0))), 0);
        assert_eq!(normalize_ct_type(Some(&json!(1))), 1);
        assert_eq!(normalize_ct_type(Some(&json!(2))), 1);
        assert_eq!(normalize_ct_type(Some(&json!({"$numberInt": "7"}))), 1);
        assert_eq!(normalize_ct_type(Some(&json!("1"))), 1);
        assert_eq!(normalize_ct_type(Some(&json!(-1))), 0);
        assert_eq!(normalize_ct_type(None), 0);
    }

    #[test]
    fn test_convert_full_record() {
        let raw = json!({
            "_id": {"$oid": "65a0"},
            "random_id": "9f1c",
            "type": "lxc",
            "ct_type": {"$numberInt": "2"},
            "disk_size": "20G",
            "core_count": {"$numberInt": "2"},
            "ram_size": 2048,
            "os_type": "debian",
            "os_version": "12",
            "nsapp": "homeassistant",
            "method": "default",
            "pve_version": "8.2.2",
            "status": "done",
            "error": "ignored on success",
            "created_at": {"$date": "2024-01-02T03:04:05.000Z"}
        });

        let record = convert(&raw).unwrap();
        assert_eq!(record.random_id, "9f1c");
        assert_eq!(record.record_type, RecordType::Lxc);
        assert_eq!(record.ct_type, 1);
        assert_eq!(record.disk_size, Some(20));
        assert_eq!(record.core_count, Some(2));
        assert_eq!(record.ram_size, Some(2048));
        assert_eq!(record.status, Status::Success);
        assert_eq!(record.error, "");
        assert_eq!(record.exit_code, 0);
        assert_eq!(record.created.as_deref(), Some("2024-01-02 03:04:05.000Z"));
    }

    #[test]
    fn test_convert_failed_record_keeps_error() {
        let raw = json!({
            "random_id": "r2",
            "nsapp": "pihole",
            "status": "failed",
            "error": "APT failure",
            "exit_code": {"$numberInt": "100"}
        });
        let record = convert(&raw).unwrap();
        assert_eq!(record.status, Status::Failed);
        assert_eq!(record.error, "APT failure");
        assert_eq!(record.exit_code, 100);
        assert!(record.created.is_none());
    }

    #[test]
    fn test_convert_applies_defaults() {
        let raw = json!({"random_id": "r3", "type": "toaster", "created_at": "garbage"});
        let record = convert(&raw).unwrap();
        assert_eq!(record.record_type, RecordType::Lxc);
        assert_eq!(record.status, Status::Unknown);
        assert_eq!(record.nsapp, "");
        assert_eq!(record.ct_type, 0);
        assert!(record.disk_size.is_none());
        assert!(record.created.is_none());
    }

    #[test]
    fn test_convert_falls_back_to_document_id() {
        let raw = json!({"_id": {"$oid": "65a0ff"}, "nsapp": "x"});
        assert_eq!(convert(&raw).unwrap().random_id, "65a0ff");
    }

    #[test]
    fn test_convert_without_any_token() {
        assert!(convert(&json!({"nsapp": "x"})).is_none());
    }

    #[test]
    fn test_installing_is_preserved() {
        let raw = json!({"random_id": "r4", "status": "installing"});
        assert_eq!(convert(&raw).unwrap().status, Status::Installing);
    }

    #[test]
    fn test_source_base_url_trimmed() {
        let source = HttpLegacySource::new("http://legacy.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.base_url(), "http://legacy.local");
    }
}
