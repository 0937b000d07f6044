//! Oracle: the external language-model completion service
//!
//! All semantic judgement in the pipeline (labels, similarity, summaries,
//! personalization) comes from one `complete` call. Implementations return the
//! raw completion text; interpreting it is the job of the pure parsers in
//! [`prompts`].

pub mod client;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::ChatCompletionClient;

/// System instruction plus user content for one completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredPrompt {
    pub system: String,
    pub user: String,
}

impl StructuredPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Oracle errors
///
/// Callers see every variant as "oracle unavailable"; there is no retry inside
/// the client.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Oracle network error: {0}")]
    Network(String),

    #[error("Oracle configuration error: {0}")]
    Config(String),
}

/// Text completion service
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Complete one prompt, returning the raw text (possibly empty)
    async fn complete(&self, prompt: &StructuredPrompt) -> Result<String, OracleError>;
}
