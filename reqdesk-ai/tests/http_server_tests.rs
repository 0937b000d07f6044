//! HTTP server tests
//!
//! Drives the full router with `oneshot` against an in-memory database.

mod helpers;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;
use reqdesk_ai::build_router;
use reqdesk_ai::oracle::{Oracle, OracleError, StructuredPrompt};

use helpers::oracle::topical_reply;
use helpers::{body_json, call, seed_tagged_request, test_state, test_state_with_limit, topical_oracle};

const STAFF: &str = "ministry_staff";
const ADMIN: &str = "admin";
const BASIC: &str = "basic_user";
const LEADER: &str = "youth_leader";

fn request_payload(title: &str) -> serde_json::Value {
    json!({
        "title": title,
        "body": format!("{} - details long enough to pass validation", title),
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(test_state(topical_oracle()).await);

    let response = call(&app, "GET", "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "reqdesk-ai");
    assert_eq!(json["clustering_running"], false);
    assert!(json.get("last_pass").is_none());
}

#[tokio::test]
async fn test_missing_identity_headers_is_unauthorized() {
    let app = build_router(test_state(topical_oracle()).await);

    let response = call(&app, "GET", "/api/tags", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_submit_request_is_tagged_in_background() {
    let state = test_state(topical_oracle()).await;
    let app = build_router(state.clone());
    let owner = Uuid::new_v4();

    let response = call(
        &app,
        "POST",
        "/api/requests",
        Some((owner, BASIC)),
        Some(request_payload("Housing support in Aleppo")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["status"], "pending");
    assert_eq!(created["kind"], "public_request");

    state.tasks.drain().await;

    let uri = format!("/api/requests/{}", created["id"].as_str().unwrap());
    let json = body_json(call(&app, "GET", &uri, Some((owner, BASIC)), None).await).await;
    assert_eq!(json["status"], "analyzing");
    assert_eq!(json["tags"][0]["name"], "housing");
    assert_eq!(json["tags"][0]["localized_name"], "housing-localized");

    // Other constituents cannot read it
    let response = call(&app, "GET", &uri, Some((Uuid::new_v4(), BASIC)), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submit_request_validation() {
    let app = build_router(test_state(topical_oracle()).await);
    let caller = Some((Uuid::new_v4(), BASIC));

    let short_title = json!({ "title": "Hi", "body": "A body that is long enough to pass" });
    let response = call(&app, "POST", "/api/requests", caller, Some(short_title)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let short_body = json!({ "title": "Valid title", "body": "too short" });
    let response = call(&app, "POST", "/api/requests", caller, Some(short_body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_direct_requests_restricted_to_leaders() {
    let state = test_state(topical_oracle()).await;
    let app = build_router(state.clone());
    let mut payload = request_payload("Meeting with the minister");
    payload["kind"] = json!("direct_request");

    let response = call(&app, "POST", "/api/requests", Some((Uuid::new_v4(), BASIC)), Some(payload.clone())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = call(&app, "POST", "/api/requests", Some((Uuid::new_v4(), LEADER)), Some(payload)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Public requests never show up in the staff list
    call(
        &app,
        "POST",
        "/api/requests",
        Some((Uuid::new_v4(), BASIC)),
        Some(request_payload("Housing support in Aleppo")),
    )
    .await;
    state.tasks.drain().await;

    let json = body_json(call(&app, "GET", "/api/requests", Some((Uuid::new_v4(), STAFF)), None).await).await;
    let listed = json["requests"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["kind"], "direct_request");
    assert_eq!(json["page"], 1);
    assert_eq!(json["limit"], 20);
}

#[tokio::test]
async fn test_staff_routes_reject_basic_users() {
    let app = build_router(test_state(topical_oracle()).await);
    let basic = Some((Uuid::new_v4(), BASIC));

    for (method, uri) in [
        ("GET", "/api/requests"),
        ("GET", "/api/groups"),
        ("POST", "/api/clustering/run"),
    ] {
        let response = call(&app, method, uri, basic, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{} {}", method, uri);
    }

    let response = call(
        &app,
        "POST",
        "/api/responses",
        basic,
        Some(json!({ "body": "Not allowed to answer", "request_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submission_rate_limit() {
    let app = build_router(test_state_with_limit(topical_oracle(), 2).await);
    let caller = Some((Uuid::new_v4(), BASIC));

    for title in ["First request here", "Second request here"] {
        let response = call(&app, "POST", "/api/requests", caller, Some(request_payload(title))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = call(&app, "POST", "/api/requests", caller, Some(request_payload("Third request here"))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
}

#[tokio::test]
async fn test_tag_administration() {
    let app = build_router(test_state(topical_oracle()).await);
    let admin = Some((Uuid::new_v4(), ADMIN));

    let payload = json!({ "name": "Housing", "localized_name": "سكن" });
    let response = call(&app, "POST", "/api/tags", Some((Uuid::new_v4(), STAFF)), Some(payload.clone())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = call(&app, "POST", "/api/tags", admin, Some(payload)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let tag = body_json(response).await;
    assert_eq!(tag["origin"], "admin");

    // Names are unique regardless of case
    let duplicate = json!({ "name": "HOUSING", "localized_name": "سكن" });
    let response = call(&app, "POST", "/api/tags", admin, Some(duplicate)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let uri = format!("/api/tags/{}", tag["id"].as_str().unwrap());
    let response = call(&app, "PUT", &uri, admin, Some(json!({ "description": "Shelter" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["description"], "Shelter");
    assert_eq!(updated["name"], "Housing");

    let response = call(&app, "DELETE", &uri, admin, None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = call(&app, "DELETE", &uri, admin, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let listed = body_json(call(&app, "GET", "/api/tags", Some((Uuid::new_v4(), BASIC)), None).await).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);
}

/// Answers like the topical oracle but can be held until released
struct GatedOracle {
    armed: AtomicBool,
    release: Notify,
}

#[async_trait]
impl Oracle for GatedOracle {
    async fn complete(&self, prompt: &StructuredPrompt) -> Result<String, OracleError> {
        if self.armed.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        topical_reply(prompt)
    }
}

#[tokio::test]
async fn test_concurrent_clustering_request_conflicts() {
    let oracle = Arc::new(GatedOracle {
        armed: AtomicBool::new(false),
        release: Notify::new(),
    });
    let state = test_state(oracle.clone()).await;
    seed_tagged_request(&state, "Housing support in Aleppo").await;
    let app = build_router(state.clone());

    oracle.armed.store(true, Ordering::SeqCst);
    let clustering = state.clustering.clone();
    let pass = tokio::spawn(async move { clustering.run_pass().await });
    while !state.clustering.is_running() {
        tokio::task::yield_now().await;
    }

    let response = call(&app, "POST", "/api/clustering/run", Some((Uuid::new_v4(), STAFF)), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    oracle.release.notify_one();
    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.groups_created, 1);
    assert!(!state.clustering.is_running());
}

#[tokio::test]
async fn test_group_lifecycle() {
    let state = test_state(topical_oracle()).await;
    let app = build_router(state.clone());
    let staff = Some((Uuid::new_v4(), STAFF));

    let a = seed_tagged_request(&state, "Housing support in Aleppo").await;
    let b = seed_tagged_request(&state, "Housing rent assistance").await;

    let response = call(
        &app,
        "POST",
        "/api/groups",
        staff,
        Some(json!({ "title": "Housing requests", "request_ids": [a.id, b.id] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let group = body_json(response).await;
    let uri = format!("/api/groups/{}", group["id"].as_str().unwrap());

    let detail = body_json(call(&app, "GET", &uri, staff, None).await).await;
    assert_eq!(detail["members"].as_array().unwrap().len(), 2);
    assert_eq!(detail["members"][0]["status"], "grouped");
    assert!(detail["response"].is_null());

    let response = call(&app, "DELETE", &uri, staff, None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for id in [a.id, b.id] {
        let uri = format!("/api/requests/{}", id);
        let json = body_json(call(&app, "GET", &uri, staff, None).await).await;
        assert_eq!(json["status"], "pending");
        assert!(json["group_id"].is_null());
    }
}

#[tokio::test]
async fn test_manual_group_refuses_direct_and_answered_requests() {
    let state = test_state(topical_oracle()).await;
    let app = build_router(state.clone());
    let staff = Some((Uuid::new_v4(), STAFF));

    let mut payload = request_payload("Meeting with the minister");
    payload["kind"] = json!("direct_request");
    let direct = body_json(call(&app, "POST", "/api/requests", Some((Uuid::new_v4(), LEADER)), Some(payload)).await).await;

    let response = call(
        &app,
        "POST",
        "/api/groups",
        staff,
        Some(json!({ "title": "Ministry meetings", "request_ids": [direct["id"]] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let answered = seed_tagged_request(&state, "Scholarship abroad").await;
    let response = call(
        &app,
        "POST",
        "/api/responses",
        staff,
        Some(json!({ "body": "Please visit our office", "request_id": answered.id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = call(
        &app,
        "POST",
        "/api/groups",
        staff,
        Some(json!({ "title": "Scholarship requests", "request_ids": [answered.id] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Nothing was created and the answered request keeps its status
    let groups = body_json(call(&app, "GET", "/api/groups", staff, None).await).await;
    assert_eq!(groups.as_array().unwrap().len(), 0);
    let json = body_json(call(&app, "GET", &format!("/api/requests/{}", answered.id), staff, None).await).await;
    assert_eq!(json["status"], "responded");
    state.tasks.drain().await;
}

#[tokio::test]
async fn test_huge_page_number_is_rejected() {
    let app = build_router(test_state(topical_oracle()).await);
    let staff = Some((Uuid::new_v4(), STAFF));

    let uri = format!("/api/requests?page={}", i64::MAX);
    let response = call(&app, "GET", &uri, staff, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = call(&app, "GET", "/api/requests?page=3&limit=100", staff, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["page"], 3);
    assert_eq!(json["requests"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_group_with_response_cannot_be_deleted() {
    let state = test_state(topical_oracle()).await;
    let app = build_router(state.clone());
    let staff = Some((Uuid::new_v4(), STAFF));

    let a = seed_tagged_request(&state, "Housing support in Aleppo").await;
    let group = body_json(
        call(
            &app,
            "POST",
            "/api/groups",
            staff,
            Some(json!({ "title": "Housing requests", "request_ids": [a.id] })),
        )
        .await,
    )
    .await;
    let group_id = group["id"].as_str().unwrap().to_string();

    let response = call(
        &app,
        "POST",
        "/api/responses",
        staff,
        Some(json!({ "body": "Grants open next month", "group_id": group_id })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    state.tasks.drain().await;

    let response = call(&app, "DELETE", &format!("/api/groups/{}", group_id), staff, None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_response_needs_exactly_one_target() {
    let app = build_router(test_state(topical_oracle()).await);
    let staff = Some((Uuid::new_v4(), STAFF));

    let both = json!({
        "body": "An answer with two targets",
        "request_id": Uuid::new_v4(),
        "group_id": Uuid::new_v4(),
    });
    let response = call(&app, "POST", "/api/responses", staff, Some(both)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let neither = json!({ "body": "An answer with no target" });
    let response = call(&app, "POST", "/api/responses", staff, Some(neither)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = json!({ "body": "An answer for nobody", "request_id": Uuid::new_v4() });
    let response = call(&app, "POST", "/api/responses", staff, Some(missing)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_cluster_respond_end_to_end() {
    let state = test_state(topical_oracle()).await;
    let app = build_router(state.clone());
    let staff = Some((Uuid::new_v4(), STAFF));
    let owners = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

    for (owner, title) in owners.iter().zip([
        "Housing support in Aleppo",
        "Housing rent assistance",
        "Jobs for graduates",
    ]) {
        let response = call(&app, "POST", "/api/requests", Some((*owner, BASIC)), Some(request_payload(title))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    state.tasks.drain().await;

    let response = call(&app, "POST", "/api/clustering/run", staff, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["candidates"], 3);
    assert_eq!(report["groups_created"], 2);
    assert_eq!(report["failures"], 0);

    let groups = body_json(call(&app, "GET", "/api/groups", staff, None).await).await;
    let housing = groups
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["request_count"] == 2)
        .unwrap();
    assert_eq!(housing["primary_tag_name"], "housing");
    assert_eq!(housing["has_response"], false);

    let response = call(
        &app,
        "POST",
        "/api/responses",
        staff,
        Some(json!({ "body": "Rental grants open next month", "group_id": housing["id"] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let submitted = body_json(response).await;
    assert!(submitted["fanout_task_id"].is_string());
    state.tasks.drain().await;

    for owner in &owners[..2] {
        let mine = body_json(call(&app, "GET", "/api/requests/mine", Some((*owner, BASIC)), None).await).await;
        let entry = &mine[0];
        assert_eq!(entry["status"], "responded");
        assert_eq!(entry["response"]["personalized"], true);
        let body = entry["response"]["body"].as_str().unwrap();
        assert!(body.starts_with("Dear author of"));
        assert!(body.contains("Rental grants open next month"));
    }

    let mine = body_json(call(&app, "GET", "/api/requests/mine", Some((owners[2], BASIC)), None).await).await;
    assert_eq!(mine[0]["status"], "grouped");
    assert!(mine[0]["response"].is_null());

    let health = body_json(call(&app, "GET", "/health", None, None).await).await;
    assert_eq!(health["last_pass"]["groups_created"], 2);
}
