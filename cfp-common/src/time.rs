//! Timestamp utilities
//!
//! Timestamps are stored as RFC 3339 text in SQLite.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Whole calendar days between the date of `then` and the date of `now`
///
/// Calendar dates are compared, so a timestamp from late yesterday is one
/// day old this morning.
pub fn age_in_days(then: &DateTime<Utc>, now: &DateTime<Utc>) -> i64 {
    (now.date_naive() - then.date_naive()).num_days()
}
