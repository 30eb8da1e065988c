use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payloads::RawLocation;

/// What [format_timestamp] renders when there's no usable timestamp
pub const INVALID_DATE: &str = "Invalid Date";

/// A location reading as the rest of the app sees it, only ever produced by [normalize]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationRecord {
    /// Server-assigned ID of this reading
    pub id: String,
    /// Latitude in degrees, NaN if the server sent garbage
    pub latitude: f64,
    /// Longitude in degrees, NaN if the server sent garbage
    pub longitude: f64,
    /// Epoch milliseconds, `None` if it couldn't be parsed
    pub timestamp: Option<i64>,
    /// Passed through from the server as-is
    pub created_at: String,
    /// Local time rendering of [LocationRecord::timestamp]
    pub formatted_date: String,
}

impl LocationRecord {
    /// Whether both coordinates are actual numbers
    pub fn has_valid_coords(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Map a raw server record to a [LocationRecord]. Never fails, fields that can't be parsed
/// come out as NaN (coordinates) or `None` (timestamp).
pub fn normalize(raw: &RawLocation) -> LocationRecord {
    let timestamp = raw.timestamp_value.as_ref().and_then(parse_int);
    LocationRecord {
        id: raw.id.as_ref().map(value_to_string).unwrap_or_default(),
        latitude: raw.latitude.as_ref().map_or(f64::NAN, parse_float),
        longitude: raw.longitude.as_ref().map_or(f64::NAN, parse_float),
        timestamp,
        created_at: raw
            .created_at
            .as_ref()
            .map(value_to_string)
            .unwrap_or_default(),
        formatted_date: format_timestamp(timestamp),
    }
}

/// Render epoch milliseconds in the host's local time zone
pub fn format_timestamp(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%x %X").to_string())
        .unwrap_or_else(|| INVALID_DATE.to_string())
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_float(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_float_prefix(s),
        _ => f64::NAN,
    }
}

fn parse_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => parse_int_prefix(s),
        _ => None,
    }
}

fn digits_len(b: &[u8]) -> usize {
    b.iter().take_while(|c| c.is_ascii_digit()).count()
}

/// Parse the longest leading decimal literal, ignoring whatever trails it
fn parse_float_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let b = s.as_bytes();
    let mut end = 0;

    if matches!(b.first(), Some(b'+' | b'-')) {
        end += 1;
    }

    if s[end..].starts_with("Infinity") {
        return if b[0] == b'-' {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_digits = digits_len(&b[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if b.get(end) == Some(&b'.') {
        frac_digits = digits_len(&b[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }

    if int_digits == 0 && frac_digits == 0 {
        return f64::NAN;
    }

    if matches!(b.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(b.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = digits_len(&b[exp_end..]);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

/// Parse the longest leading run of base 10 digits (with an optional sign)
fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let b = s.as_bytes();
    let sign_len = usize::from(matches!(b.first(), Some(b'+' | b'-')));
    let digits = digits_len(&b[sign_len..]);
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawLocation {
        serde_json::from_value(v).expect("Failed to decode raw location")
    }

    #[test]
    fn test_normalize_strings() {
        let loc = normalize(&raw(json!({
            "id": "a1",
            "latitude": "40.7128",
            "longitude": "-74.0060",
            "timestamp_value": "1700000000000",
            "created_at": "2023-11-14T00:00:00Z"
        })));

        assert_eq!(loc.id, "a1");
        assert_eq!(loc.latitude, 40.7128);
        assert_eq!(loc.longitude, -74.006);
        assert_eq!(loc.timestamp, Some(1_700_000_000_000));
        assert_eq!(loc.created_at, "2023-11-14T00:00:00Z");
        assert_eq!(loc.formatted_date, format_timestamp(Some(1_700_000_000_000)));
        assert_ne!(loc.formatted_date, INVALID_DATE);
        assert!(loc.has_valid_coords());
    }

    #[test]
    fn test_normalize_numbers() {
        let loc = normalize(&raw(json!({
            "id": 17,
            "latitude": 51.5,
            "longitude": -0.12,
            "timestamp_value": 1700000000000.9_f64,
        })));

        assert_eq!(loc.id, "17");
        assert_eq!(loc.latitude, 51.5);
        assert_eq!(loc.longitude, -0.12);
        assert_eq!(loc.timestamp, Some(1_700_000_000_000));
        assert_eq!(loc.created_at, "");
    }

    #[test]
    fn test_normalize_malformed() {
        let loc = normalize(&raw(json!({ "latitude": "abc" })));

        assert!(loc.latitude.is_nan());
        assert!(loc.longitude.is_nan());
        assert_eq!(loc.timestamp, None);
        assert_eq!(loc.formatted_date, INVALID_DATE);
        assert_eq!(loc.id, "");
        assert!(!loc.has_valid_coords());
    }

    #[test]
    fn test_normalize_wrong_types() {
        let loc = normalize(&raw(json!({
            "latitude": true,
            "longitude": [1.0],
            "timestamp_value": {"ms": 5},
        })));

        assert!(loc.latitude.is_nan());
        assert!(loc.longitude.is_nan());
        assert_eq!(loc.timestamp, None);
    }

    #[test]
    fn test_normalize_deterministic() {
        let input = raw(json!({
            "id": "b2",
            "latitude": "nope",
            "longitude": "12.5",
            "timestamp_value": "1700000000000",
        }));

        let a = normalize(&input);
        let b = normalize(&input);

        assert_eq!(a.id, b.id);
        assert!(a.latitude.is_nan() && b.latitude.is_nan());
        assert_eq!(a.longitude, b.longitude);
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.formatted_date, b.formatted_date);
    }

    #[test]
    fn test_float_prefix() {
        assert_eq!(parse_float_prefix("  12.5abc"), 12.5);
        assert_eq!(parse_float_prefix("-3"), -3.0);
        assert_eq!(parse_float_prefix("+.5"), 0.5);
        assert_eq!(parse_float_prefix("7."), 7.0);
        assert_eq!(parse_float_prefix("1e3x"), 1000.0);
        assert_eq!(parse_float_prefix("2e"), 2.0);
        assert_eq!(parse_float_prefix("2e+"), 2.0);
        assert_eq!(parse_float_prefix("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float_prefix("").is_nan());
        assert!(parse_float_prefix(".").is_nan());
        assert!(parse_float_prefix("-").is_nan());
        assert!(parse_float_prefix("abc").is_nan());
    }

    #[test]
    fn test_int_prefix() {
        assert_eq!(parse_int_prefix("42"), Some(42));
        assert_eq!(parse_int_prefix(" -42px"), Some(-42));
        assert_eq!(parse_int_prefix("1700000000000.75"), Some(1_700_000_000_000));
        assert_eq!(parse_int_prefix("x1"), None);
        assert_eq!(parse_int_prefix("+"), None);
        assert_eq!(parse_int_prefix("99999999999999999999"), None);
    }
}
