//! Request submission and listing handlers

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use uuid::Uuid;
use reqdesk_common::db::{Request, RequestKind, RequestStatus, Tag};

use super::{auth::Caller, require_min_chars};
use crate::db::{requests, responses, tags};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MIN_TITLE_CHARS: usize = 5;
const MIN_BODY_CHARS: usize = 20;
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// POST /api/requests body
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default = "default_kind")]
    pub kind: RequestKind,
    pub title: String,
    pub body: String,
}

fn default_kind() -> RequestKind {
    RequestKind::Public
}

/// GET /api/requests query
#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    pub owner_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// A request with its linked tags
#[derive(Debug, Serialize)]
pub struct RequestWithTags {
    #[serde(flatten)]
    pub request: Request,
    pub tags: Vec<Tag>,
}

/// GET /api/requests response
#[derive(Debug, Serialize)]
pub struct RequestPage {
    pub requests: Vec<RequestWithTags>,
    pub page: i64,
    pub limit: i64,
}

/// Response delivered to the request owner
#[derive(Debug, Serialize)]
pub struct DeliveredResponse {
    pub id: Uuid,
    pub body: String,
    /// Personalized copy of a group response rather than a direct answer
    pub personalized: bool,
    pub created_at: DateTime<Utc>,
}

/// GET /api/requests/mine entry
#[derive(Debug, Serialize)]
pub struct OwnRequest {
    #[serde(flatten)]
    pub request: Request,
    pub tags: Vec<Tag>,
    pub response: Option<DeliveredResponse>,
}

async fn with_tags(db: &SqlitePool, request: Request) -> ApiResult<RequestWithTags> {
    let tags = tags::tags_for_request(db, request.id).await?;
    Ok(RequestWithTags { request, tags })
}

/// Rate-limit key: forwarded client address, then peer address, then caller id
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, caller: &Caller) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| caller.user_id.to_string())
}

/// POST /api/requests
///
/// Stores the request as `Pending` and schedules tagging.
pub async fn submit_request(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<Request>)> {
    let key = client_key(&headers, peer.map(|ConnectInfo(addr)| addr), &caller);
    if let Err(wait) = state.submission_limiter.check(&key) {
        tracing::warn!(client = %key, "Submission rate limit exceeded");
        return Err(ApiError::TooManyRequests {
            retry_after_secs: wait.as_secs().max(1),
        });
    }

    require_min_chars("title", &payload.title, MIN_TITLE_CHARS)?;
    require_min_chars("body", &payload.body, MIN_BODY_CHARS)?;

    if payload.kind == RequestKind::Direct && !caller.role.may_send_direct() {
        return Err(ApiError::Forbidden(
            "Only youth leaders and admins may send direct requests".to_string(),
        ));
    }

    let request = requests::insert_request(
        &state.db,
        &requests::NewRequest {
            owner_id: caller.user_id,
            kind: payload.kind,
            title: payload.title.trim().to_string(),
            body: payload.body.trim().to_string(),
        },
    )
    .await?;

    tracing::info!(
        request_id = %request.id,
        owner_id = %request.owner_id,
        kind = %request.kind,
        "Request submitted"
    );

    let tagging = state.tagging.clone();
    let request_id = request.id;
    state.tasks.spawn(format!("tagging:{}", request_id), async move {
        tagging.tag_request_by_id(request_id).await
    });

    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/requests
///
/// Staff view of direct requests; public requests are reached through groups.
pub async fn list_requests(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult<Json<RequestPage>> {
    caller.require_staff()?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| ApiError::BadRequest(format!("page {} is out of range", page)))?;

    let filter = requests::RequestFilter {
        kind: Some(RequestKind::Direct),
        status: query.status,
        owner_id: query.owner_id,
        limit,
        offset,
    };

    let mut page_items = Vec::new();
    for request in requests::list_requests(&state.db, &filter).await? {
        page_items.push(with_tags(&state.db, request).await?);
    }

    Ok(Json(RequestPage {
        requests: page_items,
        page,
        limit,
    }))
}

/// GET /api/requests/mine
pub async fn list_own_requests(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Vec<OwnRequest>>> {
    let mut own = Vec::new();

    for request in requests::list_requests_by_owner(&state.db, caller.user_id).await? {
        let tags = tags::tags_for_request(&state.db, request.id).await?;

        let response = match responses::load_personalized_for_request(&state.db, request.id).await? {
            Some(p) => Some(DeliveredResponse {
                id: p.id,
                body: p.body,
                personalized: true,
                created_at: p.created_at,
            }),
            None => responses::load_direct_response_for_request(&state.db, request.id)
                .await?
                .map(|r| DeliveredResponse {
                    id: r.id,
                    body: r.body,
                    personalized: false,
                    created_at: r.created_at,
                }),
        };

        own.push(OwnRequest {
            request,
            tags,
            response,
        });
    }

    Ok(Json(own))
}

/// GET /api/requests/:id
pub async fn get_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RequestWithTags>> {
    let request = requests::load_request(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Request {}", id)))?;
    caller.require_owner_or_staff(request.owner_id)?;

    Ok(Json(with_tags(&state.db, request).await?))
}

/// Build request routes
pub fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/api/requests", get(list_requests).post(submit_request))
        .route("/api/requests/mine", get(list_own_requests))
        .route("/api/requests/:id", get(get_request))
}
