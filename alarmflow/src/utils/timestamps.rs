//! Timestamp utilities for vendor datetime strings and local display.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Layout of vendor datetime strings (`2024-03-01 08:15:00`).
pub const VENDOR_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ecuador mainland offset (UTC-05:00, no daylight saving).
pub const GUAYAQUIL_OFFSET_SECONDS: i32 = -5 * 3600;

/// Errors that can occur during timestamp conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// The offset is outside +/- 24 hours.
    #[error("Invalid UTC offset: {0} seconds")]
    InvalidOffset(i32),

    /// The datetime string does not match the vendor layout.
    #[error("Invalid datetime '{value}': {message}")]
    InvalidFormat {
        /// The offending string.
        value: String,
        /// The parser message.
        message: String,
    },

    /// The local time does not map to a single instant.
    #[error("Ambiguous or nonexistent local time: {0}")]
    Ambiguous(String),

    /// The unix timestamp is out of range.
    #[error("Unix timestamp out of range: {0}")]
    OutOfRange(i64),
}

/// Returns the current time as unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Builds a fixed offset from seconds east of UTC.
///
/// # Errors
///
/// Returns `TimestampError::InvalidOffset` if the offset is out of range.
pub fn fixed_offset(seconds_east: i32) -> Result<FixedOffset, TimestampError> {
    FixedOffset::east_opt(seconds_east).ok_or(TimestampError::InvalidOffset(seconds_east))
}

fn to_offset(unix: i64, offset: FixedOffset) -> Result<DateTime<FixedOffset>, TimestampError> {
    DateTime::from_timestamp(unix, 0)
        .map(|utc| utc.with_timezone(&offset))
        .ok_or(TimestampError::OutOfRange(unix))
}

/// Formats unix seconds in the vendor layout at the given offset.
///
/// # Examples
///
/// ```
/// use alarmflow::utils::{fixed_offset, format_vendor_datetime};
///
/// let offset = fixed_offset(0).unwrap();
/// assert_eq!(format_vendor_datetime(0, offset).unwrap(), "1970-01-01 00:00:00");
/// ```
pub fn format_vendor_datetime(unix: i64, offset: FixedOffset) -> Result<String, TimestampError> {
    Ok(to_offset(unix, offset)?
        .format(VENDOR_DATETIME_FORMAT)
        .to_string())
}

/// Parses a vendor datetime string interpreted at the given offset.
pub fn parse_vendor_datetime(value: &str, offset: FixedOffset) -> Result<i64, TimestampError> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), VENDOR_DATETIME_FORMAT).map_err(|e| {
        TimestampError::InvalidFormat {
            value: value.to_string(),
            message: e.to_string(),
        }
    })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| TimestampError::Ambiguous(value.to_string()))
}

/// Formats unix seconds for human display at the given offset.
///
/// The output carries the offset, e.g. `2024-03-01 08:15:00 -05:00`.
pub fn format_local(unix: i64, offset: FixedOffset) -> Result<String, TimestampError> {
    Ok(to_offset(unix, offset)?
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string())
}
