//! UUID utilities
//!
//! All primary keys are UUIDv4 values stored as TEXT columns.

use uuid::Uuid;

use crate::{Error, Result};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read back from a TEXT column
///
/// A malformed key in storage is an internal error, not user input.
pub fn parse_column(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in column {}: {} ({})", column, value, e)))
}
