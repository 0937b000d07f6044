//! HTTP API handlers for reqdesk-ai
//!
//! JSON REST endpoints under `/api`, a health probe, and the SSE event stream.
//! Every `/api` handler takes a [`auth::Caller`] built from gateway headers.

pub mod auth;
pub mod clustering;
pub mod groups;
pub mod health;
pub mod requests;
pub mod responses;
pub mod sse;
pub mod tags;

pub use clustering::clustering_routes;
pub use groups::group_routes;
pub use health::health_routes;
pub use requests::request_routes;
pub use responses::response_routes;
pub use sse::event_stream;
pub use tags::tag_routes;

use crate::error::ApiError;

/// Reject `value` if, once trimmed, it has fewer than `min` characters
pub(crate) fn require_min_chars(field: &str, value: &str, min: usize) -> Result<(), ApiError> {
    if value.trim().chars().count() < min {
        return Err(ApiError::BadRequest(format!(
            "{} must be at least {} characters",
            field, min
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_chars_counts_trimmed_characters() {
        assert!(require_min_chars("title", "  abcd  ", 5).is_err());
        assert!(require_min_chars("title", "abcde", 5).is_ok());
        // Multi-byte characters count once
        assert!(require_min_chars("name", "سك", 2).is_ok());
    }
}
