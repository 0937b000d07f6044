//! Request group handlers (staff)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use reqdesk_common::db::{Request, RequestGroup, RequestKind, RequestStatus, Response, Tag};

use super::{auth::Caller, require_min_chars};
use crate::db::{groups, requests, responses, tags};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MIN_TITLE_CHARS: usize = 5;

/// POST /api/groups body
#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub title: String,
    pub description: Option<String>,
    pub primary_tag_id: Option<Uuid>,
    #[serde(default)]
    pub request_ids: Vec<Uuid>,
}

/// PUT /api/groups/:id body
///
/// `"primary_tag_id": null` clears the primary tag; omitting it keeps it.
#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub primary_tag_id: Option<Option<Uuid>>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

/// GET /api/groups/:id response
#[derive(Debug, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: RequestGroup,
    pub primary_tag: Option<Tag>,
    pub members: Vec<Request>,
    pub response: Option<Response>,
}

async fn ensure_tag_exists(state: &AppState, tag_id: Option<Uuid>) -> ApiResult<()> {
    if let Some(tag_id) = tag_id {
        if tags::load_tag(&state.db, tag_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!("Unknown tag {}", tag_id)));
        }
    }
    Ok(())
}

/// GET /api/groups
pub async fn list_groups(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Vec<groups::GroupSummary>>> {
    caller.require_staff()?;
    Ok(Json(groups::list_groups(&state.db).await?))
}

/// GET /api/groups/:id
pub async fn get_group(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GroupDetail>> {
    caller.require_staff()?;

    let group = groups::load_group(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Group {}", id)))?;

    let primary_tag = match group.primary_tag_id {
        Some(tag_id) => tags::load_tag(&state.db, tag_id).await?,
        None => None,
    };
    let members = requests::list_group_members(&state.db, id).await?;
    let response = responses::load_group_response(&state.db, id).await?;

    Ok(Json(GroupDetail {
        group,
        primary_tag,
        members,
        response,
    }))
}

/// POST /api/groups
///
/// Manual grouping; every listed request is re-parented and marked `Grouped`.
/// Direct requests (400) and answered requests (409) are refused before any
/// write.
pub async fn create_group(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<RequestGroup>)> {
    caller.require_staff()?;
    require_min_chars("title", &payload.title, MIN_TITLE_CHARS)?;
    ensure_tag_exists(&state, payload.primary_tag_id).await?;

    for request_id in &payload.request_ids {
        let request = requests::load_request(&state.db, *request_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Request {}", request_id)))?;
        if request.kind == RequestKind::Direct {
            return Err(ApiError::BadRequest(format!(
                "Request {} is a direct request and cannot be grouped",
                request_id
            )));
        }
        if request.status == RequestStatus::Responded {
            return Err(ApiError::Conflict(format!(
                "Request {} has already been answered",
                request_id
            )));
        }
    }

    let group = groups::insert_group(
        &state.db,
        &groups::NewGroup {
            title: payload.title,
            description: payload.description,
            primary_tag_id: payload.primary_tag_id,
        },
    )
    .await?;

    for request_id in &payload.request_ids {
        requests::assign_group(&state.db, *request_id, group.id).await?;
    }

    tracing::info!(
        group_id = %group.id,
        members = payload.request_ids.len(),
        "Group created manually"
    );
    Ok((StatusCode::CREATED, Json(group)))
}

/// PUT /api/groups/:id
pub async fn update_group(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateGroupRequest>,
) -> ApiResult<Json<RequestGroup>> {
    caller.require_staff()?;
    if let Some(title) = &payload.title {
        require_min_chars("title", title, MIN_TITLE_CHARS)?;
    }
    if let Some(tag_id) = payload.primary_tag_id {
        ensure_tag_exists(&state, tag_id).await?;
    }

    let group = groups::update_group(
        &state.db,
        id,
        &groups::GroupUpdate {
            title: payload.title,
            description: payload.description,
            primary_tag_id: payload.primary_tag_id,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Group {}", id)))?;

    Ok(Json(group))
}

/// DELETE /api/groups/:id
///
/// Members return to `Pending` with no group. A group that already has a
/// response cannot be deleted.
pub async fn delete_group(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    caller.require_staff()?;

    if groups::load_group(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Group {}", id)));
    }
    if groups::count_group_responses(&state.db, id).await? > 0 {
        return Err(ApiError::Conflict(
            "Group has responses and cannot be deleted".to_string(),
        ));
    }

    let released = requests::ungroup_members(&state.db, id).await?;
    groups::delete_group(&state.db, id).await?;

    tracing::info!(group_id = %id, released, "Group deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Build group routes
pub fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/api/groups", get(list_groups).post(create_group))
        .route(
            "/api/groups/:id",
            get(get_group).put(update_group).delete(delete_group),
        )
}
