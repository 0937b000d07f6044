//! Staff response handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use reqdesk_common::db::{PersonalizedResponse, Response, ResponseTarget};

use super::{auth::Caller, require_min_chars};
use crate::db::{requests, responses};
use crate::error::{ApiError, ApiResult};
use crate::services::SubmittedResponse;
use crate::AppState;

const MIN_BODY_CHARS: usize = 10;

/// POST /api/responses body; exactly one target id
#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub body: String,
    pub request_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

/// GET /api/responses/request/:id response
#[derive(Debug, Serialize)]
pub struct RequestResponses {
    pub request_id: Uuid,
    pub direct: Option<Response>,
    pub personalized: Option<PersonalizedResponse>,
}

/// POST /api/responses
///
/// Group responses return before fan-out finishes.
pub async fn submit_response(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<SubmitResponseRequest>,
) -> ApiResult<(StatusCode, Json<SubmittedResponse>)> {
    caller.require_staff()?;
    require_min_chars("body", &payload.body, MIN_BODY_CHARS)?;

    let target = match (payload.request_id, payload.group_id) {
        (Some(request_id), None) => ResponseTarget::Request(request_id),
        (None, Some(group_id)) => ResponseTarget::Group(group_id),
        _ => {
            return Err(ApiError::BadRequest(
                "Exactly one of request_id or group_id is required".to_string(),
            ))
        }
    };

    let submitted = state
        .fanout
        .submit_response(caller.user_id, payload.body.trim(), target)
        .await?;

    Ok((StatusCode::CREATED, Json(submitted)))
}

/// GET /api/responses/request/:id
pub async fn responses_for_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RequestResponses>> {
    let request = requests::load_request(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Request {}", id)))?;
    caller.require_owner_or_staff(request.owner_id)?;

    Ok(Json(RequestResponses {
        request_id: id,
        direct: responses::load_direct_response_for_request(&state.db, id).await?,
        personalized: responses::load_personalized_for_request(&state.db, id).await?,
    }))
}

/// Build response routes
pub fn response_routes() -> Router<AppState> {
    Router::new()
        .route("/api/responses", post(submit_response))
        .route("/api/responses/request/:id", get(responses_for_request))
}
