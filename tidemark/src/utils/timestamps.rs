//! Timestamp utilities.
//!
//! Source data carries timestamps either as ISO-8601 strings
//! (`"2024-01-05T00:00:00"`) or as Unix epoch numbers
//! (`1704067200.0`); both are accepted wherever a timestamp is expected.

use crate::core::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The input type is not supported.
    #[error("Unsupported timestamp type: expected string or number")]
    UnsupportedType,

    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),

    /// Nanosecond precision is not supported.
    #[error("Nanosecond precision timestamps are not supported")]
    NanosecondPrecision,
}

/// Detected precision of a Unix timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnixPrecision {
    /// Seconds (<=10 digits)
    Seconds,
    /// Milliseconds (<=13 digits)
    Milliseconds,
    /// Microseconds (<=16 digits)
    Microseconds,
}

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use tidemark::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as ISO 8601 string.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Detects the precision of a Unix timestamp based on digit count.
///
/// # Errors
///
/// Returns `TimestampError::NanosecondPrecision` if the timestamp has more than 16 digits.
#[allow(clippy::cast_possible_truncation)]
pub fn detect_unix_precision(timestamp: f64) -> Result<UnixPrecision, TimestampError> {
    let int_part = timestamp.abs().trunc() as i64;
    let digit_count = if int_part == 0 {
        1
    } else {
        int_part.to_string().len()
    };

    match digit_count {
        0..=10 => Ok(UnixPrecision::Seconds),
        11..=13 => Ok(UnixPrecision::Milliseconds),
        14..=16 => Ok(UnixPrecision::Microseconds),
        _ => Err(TimestampError::NanosecondPrecision),
    }
}

/// Parses a timestamp from an ISO 8601 string or a numeric string.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }

    if let Ok(num) = trimmed.parse::<f64>() {
        return parse_unix_timestamp(num);
    }

    parse_iso8601(trimmed)
}

/// Parses a timestamp column value (string or number).
pub fn parse_timestamp_value(value: &Value) -> Result<Timestamp, TimestampError> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_f64()
            .ok_or(TimestampError::UnsupportedType)
            .and_then(parse_unix_timestamp),
        _ => Err(TimestampError::UnsupportedType),
    }
}

/// Returns the calendar date (UTC) of a timestamp column value.
#[must_use]
pub fn date_of(value: &Value) -> Option<NaiveDate> {
    parse_timestamp_value(value).ok().map(|ts| ts.date_naive())
}

/// Parses a Unix timestamp with automatic precision detection.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_unix_timestamp(value: f64) -> Result<Timestamp, TimestampError> {
    let has_fraction = (value - value.trunc()).abs() > f64::EPSILON;

    if has_fraction {
        let secs = value.trunc() as i64;
        let nanos = (value.fract().abs() * 1_000_000_000.0) as u32;
        return Utc
            .timestamp_opt(secs, nanos)
            .single()
            .ok_or_else(|| TimestampError::InvalidFormat(value.to_string()));
    }

    let precision = detect_unix_precision(value)?;
    let ts = value as i64;

    let (secs, nanos) = match precision {
        UnixPrecision::Seconds => (ts, 0),
        UnixPrecision::Milliseconds => (ts / 1000, ((ts % 1000) * 1_000_000) as u32),
        UnixPrecision::Microseconds => (ts / 1_000_000, ((ts % 1_000_000) * 1000) as u32),
    };

    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| TimestampError::InvalidFormat(value.to_string()))
}

fn parse_iso8601(s: &str) -> Result<Timestamp, TimestampError> {
    let normalized = s.replace('Z', "+00:00");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.with_timezone(&Utc));
    }

    let datetime_formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in datetime_formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }

    Err(TimestampError::InvalidFormat(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_detect_unix_precision() {
        assert_eq!(detect_unix_precision(1_696_512_000.0).unwrap(), UnixPrecision::Seconds);
        assert_eq!(
            detect_unix_precision(1_696_512_000_000.0).unwrap(),
            UnixPrecision::Milliseconds
        );
        assert_eq!(
            detect_unix_precision(1_696_512_000_000_000.0).unwrap(),
            UnixPrecision::Microseconds
        );
    }

    #[test]
    fn test_parse_iso8601_without_offset() {
        let dt = parse_timestamp("2024-01-05T00:00:00").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 5));
    }

    #[test]
    fn test_parse_iso8601_with_zulu() {
        let dt = parse_timestamp("2023-10-05T14:30:00Z").unwrap();
        assert_eq!(dt.month(), 10);
    }

    #[test]
    fn test_parse_unix_value() {
        let dt = parse_timestamp_value(&json!(1_704_067_200.0)).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 1));
    }

    #[test]
    fn test_date_of() {
        let date = date_of(&json!("2024-01-17T08:15:00")).unwrap();
        assert_eq!(date.to_string(), "2024-01-17");
        assert!(date_of(&json!(true)).is_none());
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(matches!(parse_timestamp("  "), Err(TimestampError::EmptyString)));
    }
}
