//! Utility functions for timestamp handling.

pub mod timestamps;

pub use timestamps::{
    date_of, format_iso8601, iso_timestamp, now_utc, parse_timestamp, parse_timestamp_value,
    Timestamp, TimestampError, UnixPrecision,
};
