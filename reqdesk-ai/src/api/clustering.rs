//! Manual clustering trigger

use axum::{extract::State, routing::post, Json, Router};

use super::auth::Caller;
use crate::error::ApiResult;
use crate::services::PassReport;
use crate::AppState;

/// POST /api/clustering/run
///
/// Runs one pass and waits for it. 409 Conflict while a pass is running.
pub async fn run_clustering(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<PassReport>> {
    caller.require_staff()?;

    tracing::info!(user_id = %caller.user_id, "Manual clustering pass requested");
    let report = state.clustering.run_pass().await?;

    Ok(Json(report))
}

/// Build clustering routes
pub fn clustering_routes() -> Router<AppState> {
    Router::new().route("/api/clustering/run", post(run_clustering))
}
