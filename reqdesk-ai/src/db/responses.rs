//! Response and personalized response database operations

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;
use reqdesk_common::db::{PersonalizedResponse, Response, ResponseTarget};
use reqdesk_common::{time, uuid_utils, Result};

const RESPONSE_COLUMNS: &str =
    "id, request_id, group_id, responder_id, body, is_group_response, created_at";
const PERSONALIZED_COLUMNS: &str = "id, request_id, response_id, body, sent_at, created_at";

fn response_from_row(row: &SqliteRow) -> Result<Response> {
    let id: String = row.get("id");
    let request_id: Option<String> = row.get("request_id");
    let group_id: Option<String> = row.get("group_id");
    let responder_id: String = row.get("responder_id");
    let created_at: String = row.get("created_at");

    Ok(Response {
        id: uuid_utils::parse_column("responses.id", &id)?,
        request_id: request_id
            .map(|r| uuid_utils::parse_column("responses.request_id", &r))
            .transpose()?,
        group_id: group_id
            .map(|g| uuid_utils::parse_column("responses.group_id", &g))
            .transpose()?,
        responder_id: uuid_utils::parse_column("responses.responder_id", &responder_id)?,
        body: row.get("body"),
        is_group_response: row.get::<i64, _>("is_group_response") != 0,
        created_at: time::parse_column("responses.created_at", &created_at)?,
    })
}

fn personalized_from_row(row: &SqliteRow) -> Result<PersonalizedResponse> {
    let id: String = row.get("id");
    let request_id: String = row.get("request_id");
    let response_id: String = row.get("response_id");
    let sent_at: String = row.get("sent_at");
    let created_at: String = row.get("created_at");

    Ok(PersonalizedResponse {
        id: uuid_utils::parse_column("personalized_responses.id", &id)?,
        request_id: uuid_utils::parse_column("personalized_responses.request_id", &request_id)?,
        response_id: uuid_utils::parse_column("personalized_responses.response_id", &response_id)?,
        body: row.get("body"),
        sent_at: time::parse_column("personalized_responses.sent_at", &sent_at)?,
        created_at: time::parse_column("personalized_responses.created_at", &created_at)?,
    })
}

/// Persist a staff response addressed to exactly one request or one group
pub async fn insert_response(
    pool: &SqlitePool,
    target: ResponseTarget,
    responder_id: Uuid,
    body: &str,
) -> Result<Response> {
    let (request_id, group_id) = match target {
        ResponseTarget::Request(id) => (Some(id), None),
        ResponseTarget::Group(id) => (None, Some(id)),
    };

    let response = Response {
        id: uuid_utils::generate(),
        request_id,
        group_id,
        responder_id,
        body: body.to_string(),
        is_group_response: target.is_group(),
        created_at: time::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO responses (id, request_id, group_id, responder_id, body, is_group_response, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(response.id.to_string())
    .bind(response.request_id.map(|r| r.to_string()))
    .bind(response.group_id.map(|g| g.to_string()))
    .bind(response.responder_id.to_string())
    .bind(&response.body)
    .bind(response.is_group_response as i64)
    .bind(time::to_column(&response.created_at))
    .execute(pool)
    .await?;

    Ok(response)
}

pub async fn load_response(pool: &SqlitePool, id: Uuid) -> Result<Option<Response>> {
    let row = sqlx::query(&format!("SELECT {} FROM responses WHERE id = ?", RESPONSE_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(response_from_row).transpose()
}

/// Latest direct (non-group) response to a request
pub async fn load_direct_response_for_request(
    pool: &SqlitePool,
    request_id: Uuid,
) -> Result<Option<Response>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM responses WHERE request_id = ? ORDER BY created_at DESC LIMIT 1",
        RESPONSE_COLUMNS
    ))
    .bind(request_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(response_from_row).transpose()
}

/// Latest response addressed to a group
pub async fn load_group_response(pool: &SqlitePool, group_id: Uuid) -> Result<Option<Response>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM responses WHERE group_id = ? ORDER BY created_at DESC LIMIT 1",
        RESPONSE_COLUMNS
    ))
    .bind(group_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(response_from_row).transpose()
}

/// Record one member's personalized copy of a group response
pub async fn insert_personalized_response(
    pool: &SqlitePool,
    request_id: Uuid,
    response_id: Uuid,
    body: &str,
) -> Result<PersonalizedResponse> {
    let now = time::now();
    let personalized = PersonalizedResponse {
        id: uuid_utils::generate(),
        request_id,
        response_id,
        body: body.to_string(),
        sent_at: now,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO personalized_responses (id, request_id, response_id, body, sent_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(personalized.id.to_string())
    .bind(personalized.request_id.to_string())
    .bind(personalized.response_id.to_string())
    .bind(&personalized.body)
    .bind(time::to_column(&personalized.sent_at))
    .bind(time::to_column(&personalized.created_at))
    .execute(pool)
    .await?;

    Ok(personalized)
}

/// Latest personalized response delivered to a request
pub async fn load_personalized_for_request(
    pool: &SqlitePool,
    request_id: Uuid,
) -> Result<Option<PersonalizedResponse>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM personalized_responses WHERE request_id = ? ORDER BY created_at DESC LIMIT 1",
        PERSONALIZED_COLUMNS
    ))
    .bind(request_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(personalized_from_row).transpose()
}

/// Every personalized copy produced from one group response
pub async fn list_personalized_for_response(
    pool: &SqlitePool,
    response_id: Uuid,
) -> Result<Vec<PersonalizedResponse>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM personalized_responses WHERE response_id = ? ORDER BY created_at ASC, id ASC",
        PERSONALIZED_COLUMNS
    ))
    .bind(response_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(personalized_from_row).collect()
}
