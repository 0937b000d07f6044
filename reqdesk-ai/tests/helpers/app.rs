//! Application state and HTTP helpers

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;
use reqdesk_ai::db::requests::{insert_request, NewRequest};
use reqdesk_ai::oracle::Oracle;
use reqdesk_ai::services::SubmissionRateLimiter;
use reqdesk_ai::AppState;
use reqdesk_common::db::{init_memory_database, Request as StoredRequest, RequestKind};
use reqdesk_common::events::EventBus;

pub async fn test_state(oracle: Arc<dyn Oracle>) -> AppState {
    test_state_with_limit(oracle, 100).await
}

pub async fn test_state_with_limit(oracle: Arc<dyn Oracle>, max_submissions: u32) -> AppState {
    let pool = init_memory_database()
        .await
        .expect("Failed to create in-memory database");
    let limiter = SubmissionRateLimiter::new(max_submissions, Duration::from_secs(3600))
        .expect("Failed to build limiter");

    AppState::new(pool, EventBus::new(100), oracle, limiter)
}

/// Insert a public request and run tagging on it, leaving it `Analyzing`
pub async fn seed_tagged_request(state: &AppState, title: &str) -> StoredRequest {
    let request = insert_request(
        &state.db,
        &NewRequest {
            owner_id: Uuid::new_v4(),
            kind: RequestKind::Public,
            title: title.to_string(),
            body: format!("{} - details long enough to be a valid request body", title),
        },
    )
    .await
    .expect("Failed to insert request");

    state
        .tagging
        .tag_request_by_id(request.id)
        .await
        .expect("Tagging failed");

    request
}

/// Send one request through a fresh router
pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    caller: Option<(Uuid, &str)>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = caller {
        builder = builder
            .header("x-user-id", user_id.to_string())
            .header("x-user-role", role);
    }

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    if body.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&body).unwrap()
}
