//! Tolerant deserializers for upstream scalar quirks.
//!
//! The Winticket API is loose about scalar types: booleans arrive as JSON
//! booleans or as `"true"`/`"false"` strings, numbers as numbers or digit
//! strings, ids as strings or integers, and timestamps in any of four
//! formats. These helpers normalize all of that at the deserialization
//! edge so the rest of the pipeline works with plain `Option<i64>` /
//! `Option<f64>` / `Option<String>` fields.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Plausible unix-second range for upstream timestamps (2000..2050).
const MIN_UNIX_SECONDS: i64 = 946_684_800;
const MAX_UNIX_SECONDS: i64 = 2_524_608_000;

pub fn flex_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value_to_bool(value.as_ref()))
}

pub fn flex_bool_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        other => Ok(Some(value_to_bool(other.as_ref()))),
    }
}

pub fn flex_i64_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_i64))
}

pub fn flex_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

pub fn flex_string_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string))
}

/// Timestamps arrive as unix seconds, ISO-8601 (with or without `Z`),
/// `YYYY-MM-DD HH:MM:SS[.fff]`, or digit strings. Naive datetimes are
/// treated as UTC; the MySQL zero-date literal maps to `None`.
pub fn unix_ts_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => parse_unix_seconds(&s),
        _ => None,
    })
}

pub fn value_to_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        _ => false,
    }
}

pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { None } else { s.parse().ok() }
        }
        _ => None,
    }
}

pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { None } else { s.parse().ok() }
        }
        _ => None,
    }
}

pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse one of the accepted timestamp string formats into unix seconds.
pub fn parse_unix_seconds(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "0000-00-00 00:00:00" {
        return None;
    }

    if raw.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.timestamp());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Some(naive.and_utc().timestamp());
        }
    }

    if raw.contains(' ') && raw.contains(':') {
        for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(naive.and_utc().timestamp());
            }
        }
    }

    if raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(ts) = raw.parse::<i64>() {
            if ts > MIN_UNIX_SECONDS && ts < MAX_UNIX_SECONDS {
                return Some(ts);
            }
        }
    }

    None
}

/// Parse a calendar date given as `YYYY-MM-DD` or `YYYYMMDD`.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.contains('-') {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    } else {
        NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_accepts_bools_strings_and_numbers() {
        assert!(value_to_bool(Some(&json!(true))));
        assert!(!value_to_bool(Some(&json!(false))));
        assert!(value_to_bool(Some(&json!("true"))));
        assert!(value_to_bool(Some(&json!("TRUE"))));
        assert!(!value_to_bool(Some(&json!("false"))));
        assert!(value_to_bool(Some(&json!(1))));
        assert!(!value_to_bool(Some(&json!(0))));
        assert!(!value_to_bool(None));
    }

    #[test]
    fn numbers_accept_digit_strings() {
        assert_eq!(value_to_i64(&json!("12")), Some(12));
        assert_eq!(value_to_i64(&json!(12.0)), Some(12));
        assert_eq!(value_to_i64(&json!("")), None);
        assert_eq!(value_to_i64(&json!("abc")), None);
        assert_eq!(value_to_f64(&json!("3.57")), Some(3.57));
        assert_eq!(value_to_f64(&json!(3.57)), Some(3.57));
    }

    #[test]
    fn iso8601_with_zulu_converts_to_unix_seconds() {
        assert_eq!(parse_unix_seconds("2024-01-10T05:00:00Z"), Some(1_704_862_800));
    }

    #[test]
    fn naive_datetime_is_treated_as_utc() {
        assert_eq!(parse_unix_seconds("2024-01-10 05:00:00"), Some(1_704_862_800));
        assert_eq!(
            parse_unix_seconds("2024-01-10 05:00:00.500"),
            Some(1_704_862_800)
        );
    }

    #[test]
    fn zero_date_is_null() {
        assert_eq!(parse_unix_seconds("0000-00-00 00:00:00"), None);
    }

    #[test]
    fn digit_strings_outside_plausible_range_are_rejected() {
        assert_eq!(parse_unix_seconds("1704862800"), Some(1_704_862_800));
        assert_eq!(parse_unix_seconds("12"), None);
        assert_eq!(parse_unix_seconds("99999999999"), None);
    }

    #[test]
    fn flexible_dates_accept_both_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(parse_flexible_date("2024-01-10"), Some(expected));
        assert_eq!(parse_flexible_date("20240110"), Some(expected));
        assert_eq!(parse_flexible_date("2024/01/10"), None);
    }
}
