//! Date and timestamp utilities

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::{Error, Result};

/// Wire and storage format for calendar dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Today's date in the server's local timezone
///
/// Predictions are keyed by the local calendar day the stops operate in.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid date format '{}'. Use YYYY-MM-DD",
            value
        ))
    })
}

/// Format a date as `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse an RFC 3339 timestamp stored as TEXT
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}
