//! reqdesk-ai library interface
//!
//! Request tagging, clustering, and response fan-out behind an axum router.
//! Exposed as a library so integration tests can drive the router and the
//! pipeline services directly.

pub mod api;
pub mod db;
pub mod error;
pub mod oracle;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use reqdesk_common::events::EventBus;

use crate::oracle::Oracle;
use crate::services::{
    BackgroundTasks, ClusteringOrchestrator, ResponseFanout, SubmissionRateLimiter, TaggingEngine,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Executor for tagging and fan-out work
    pub tasks: BackgroundTasks,
    pub tagging: Arc<TaggingEngine>,
    pub clustering: Arc<ClusteringOrchestrator>,
    pub fanout: ResponseFanout,
    /// Per-client limit on request submissions
    pub submission_limiter: Arc<SubmissionRateLimiter>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        oracle: Arc<dyn Oracle>,
        submission_limiter: SubmissionRateLimiter,
    ) -> Self {
        let tasks = BackgroundTasks::new(event_bus.clone());

        Self {
            tagging: Arc::new(TaggingEngine::new(
                db.clone(),
                Arc::clone(&oracle),
                event_bus.clone(),
            )),
            clustering: Arc::new(ClusteringOrchestrator::new(
                db.clone(),
                Arc::clone(&oracle),
                event_bus.clone(),
            )),
            fanout: ResponseFanout::new(db.clone(), oracle, event_bus.clone(), tasks.clone()),
            submission_limiter: Arc::new(submission_limiter),
            startup_time: Utc::now(),
            tasks,
            db,
            event_bus,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::request_routes())
        .merge(api::tag_routes())
        .merge(api::group_routes())
        .merge(api::response_routes())
        .merge(api::clustering_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
