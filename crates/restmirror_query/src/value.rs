//! Value coercion for comparisons.
//!
//! Every comparison tries, in order:
//! 1. Both sides parse as dates → compare timestamps
//! 2. Both sides parse as numbers → compare numerically
//! 3. Otherwise → case-sensitive string comparison

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::cmp::Ordering;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a date or datetime string into UTC milliseconds.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]`, `YYYY-MM-DD HH:MM:SS[.f]`
/// and `YYYY-MM-DD`. Naive values are taken as UTC.
pub fn parse_date_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    // Cheap reject: every accepted format starts with a 4-digit year and a dash.
    if raw.len() < 10 || raw.as_bytes().get(4) != Some(&b'-') {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Compares two raw strings with date → number → string precedence.
pub fn compare_text(left: &str, right: &str) -> Ordering {
    if let (Some(a), Some(b)) = (parse_date_millis(left), parse_date_millis(right)) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (parse_number(left), parse_number(right)) {
        return a.total_cmp(&b);
    }
    left.cmp(right)
}

/// Renders a scalar JSON value as comparison text.
///
/// Returns `None` for null. Arrays and objects render as compact JSON.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Compares two optional JSON values for ordering.
///
/// Missing and null values sort before present ones.
pub(crate) fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.and_then(value_text);
    let right = right.and_then(value_text);
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_text(&a, &b),
    }
}
