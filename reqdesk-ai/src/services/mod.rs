//! Request pipeline services
//!
//! Tagging runs after submission, clustering runs on a timer or on demand,
//! and fan-out runs after a group response. Each service owns a pool handle,
//! the shared oracle, and the event bus.

pub mod clustering;
pub mod fanout;
pub mod rate_limit;
pub mod scheduler;
pub mod similarity;
pub mod tagging;
pub mod tasks;

use thiserror::Error;

use crate::oracle::OracleError;

pub use clustering::{select_primary_tag, ClusteringOrchestrator, PassReport};
pub use fanout::{FanoutReport, ResponseFanout, SubmittedResponse};
pub use rate_limit::SubmissionRateLimiter;
pub use scheduler::{spawn_clustering_timer, spawn_limiter_sweep};
pub use similarity::SimilarityResolver;
pub use tagging::{TagAssignment, TaggingEngine};
pub use tasks::BackgroundTasks;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Storage failure: {0}")]
    Storage(#[from] reqdesk_common::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A clustering pass is already in progress")]
    PassInProgress,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
