//! Tag vocabulary handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use reqdesk_common::db::{Tag, TagOrigin};

use super::{auth::Caller, require_min_chars};
use crate::db::tags;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MIN_NAME_CHARS: usize = 2;

/// POST /api/tags body
#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
    pub localized_name: String,
    pub description: Option<String>,
}

/// PUT /api/tags/:id body
#[derive(Debug, Deserialize)]
pub struct UpdateTagRequest {
    pub name: Option<String>,
    pub localized_name: Option<String>,
    pub description: Option<String>,
}

fn duplicate_name(name: &str) -> ApiError {
    ApiError::BadRequest(format!("Tag already exists: {}", name.trim()))
}

/// GET /api/tags
pub async fn list_tags(State(state): State<AppState>, _caller: Caller) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(tags::list_tags(&state.db).await?))
}

/// POST /api/tags
pub async fn create_tag(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateTagRequest>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    caller.require_admin()?;
    require_min_chars("name", &payload.name, MIN_NAME_CHARS)?;
    require_min_chars("localized_name", &payload.localized_name, MIN_NAME_CHARS)?;

    if tags::find_tag_by_name(&state.db, &payload.name).await?.is_some() {
        return Err(duplicate_name(&payload.name));
    }

    let tag = tags::insert_tag(
        &state.db,
        &tags::NewTag {
            name: payload.name.clone(),
            localized_name: payload.localized_name,
            description: payload.description,
            origin: TagOrigin::Staff,
        },
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            duplicate_name(&payload.name)
        } else {
            e.into()
        }
    })?;

    tracing::info!(tag_id = %tag.id, name = %tag.name, "Tag created by staff");
    Ok((StatusCode::CREATED, Json(tag)))
}

/// PUT /api/tags/:id
pub async fn update_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTagRequest>,
) -> ApiResult<Json<Tag>> {
    caller.require_admin()?;
    if let Some(name) = &payload.name {
        require_min_chars("name", name, MIN_NAME_CHARS)?;
    }
    if let Some(localized_name) = &payload.localized_name {
        require_min_chars("localized_name", localized_name, MIN_NAME_CHARS)?;
    }

    let update = tags::TagUpdate {
        name: payload.name.clone(),
        localized_name: payload.localized_name,
        description: payload.description,
    };

    let tag = tags::update_tag(&state.db, id, &update)
        .await
        .map_err(|e| match (&payload.name, e.is_unique_violation()) {
            (Some(name), true) => duplicate_name(name),
            _ => e.into(),
        })?
        .ok_or_else(|| ApiError::NotFound(format!("Tag {}", id)))?;

    Ok(Json(tag))
}

/// DELETE /api/tags/:id
///
/// Removes the tag's links; groups using it lose their primary tag.
pub async fn delete_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    caller.require_admin()?;

    if !tags::delete_tag(&state.db, id).await? {
        return Err(ApiError::NotFound(format!("Tag {}", id)));
    }

    tracing::info!(tag_id = %id, "Tag deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Build tag routes
pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tags", get(list_tags).post(create_tag))
        .route("/api/tags/:id", put(update_tag).delete(delete_tag))
}
