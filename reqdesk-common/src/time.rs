//! Timestamp utilities
//!
//! Timestamps are persisted as RFC 3339 strings.

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert seconds to duration
pub fn secs_to_duration(secs: u64) -> std::time::Duration {
    std::time::Duration::from_secs(secs)
}

/// Format a timestamp for a TEXT column
pub fn to_column(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a timestamp read back from a TEXT column
pub fn parse_column(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
