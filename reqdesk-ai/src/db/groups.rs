//! Request group database operations

use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;
use reqdesk_common::db::RequestGroup;
use reqdesk_common::{time, uuid_utils, Result};

const GROUP_COLUMNS: &str = "id, title, description, primary_tag_id, created_at, updated_at";

/// Fields for a new group
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub title: String,
    pub description: Option<String>,
    pub primary_tag_id: Option<Uuid>,
}

/// Partial group update
///
/// `primary_tag_id: Some(None)` clears the primary tag.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub primary_tag_id: Option<Option<Uuid>>,
}

/// Group listing row with member counts
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: RequestGroup,
    pub primary_tag_name: Option<String>,
    pub request_count: i64,
    /// Members still `pending` or `analyzing`
    pub pending_count: i64,
    pub responded_count: i64,
    pub has_response: bool,
}

fn group_from_row(row: &SqliteRow) -> Result<RequestGroup> {
    let id: String = row.get("id");
    let primary_tag_id: Option<String> = row.get("primary_tag_id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(RequestGroup {
        id: uuid_utils::parse_column("request_groups.id", &id)?,
        title: row.get("title"),
        description: row.get("description"),
        primary_tag_id: primary_tag_id
            .map(|t| uuid_utils::parse_column("request_groups.primary_tag_id", &t))
            .transpose()?,
        created_at: time::parse_column("request_groups.created_at", &created_at)?,
        updated_at: time::parse_column("request_groups.updated_at", &updated_at)?,
    })
}

pub async fn insert_group(pool: &SqlitePool, new: &NewGroup) -> Result<RequestGroup> {
    let now = time::now();
    let group = RequestGroup {
        id: uuid_utils::generate(),
        title: new.title.trim().to_string(),
        description: new.description.clone(),
        primary_tag_id: new.primary_tag_id,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO request_groups (id, title, description, primary_tag_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(group.id.to_string())
    .bind(&group.title)
    .bind(&group.description)
    .bind(group.primary_tag_id.map(|t| t.to_string()))
    .bind(time::to_column(&group.created_at))
    .bind(time::to_column(&group.updated_at))
    .execute(pool)
    .await?;

    Ok(group)
}

pub async fn load_group(pool: &SqlitePool, id: Uuid) -> Result<Option<RequestGroup>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM request_groups WHERE id = ?",
        GROUP_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(group_from_row).transpose()
}

/// All groups, newest first, with primary tag name and member counts
pub async fn list_groups(pool: &SqlitePool) -> Result<Vec<GroupSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT
            g.id, g.title, g.description, g.primary_tag_id, g.created_at, g.updated_at,
            t.name AS primary_tag_name,
            (SELECT COUNT(*) FROM requests r WHERE r.group_id = g.id) AS request_count,
            (SELECT COUNT(*) FROM requests r
                WHERE r.group_id = g.id AND r.status IN ('pending', 'analyzing')) AS pending_count,
            (SELECT COUNT(*) FROM requests r
                WHERE r.group_id = g.id AND r.status = 'responded') AS responded_count,
            EXISTS (SELECT 1 FROM responses s WHERE s.group_id = g.id) AS has_response
        FROM request_groups g
        LEFT JOIN tags t ON t.id = g.primary_tag_id
        ORDER BY g.created_at DESC, g.id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(GroupSummary {
                group: group_from_row(row)?,
                primary_tag_name: row.get("primary_tag_name"),
                request_count: row.get("request_count"),
                pending_count: row.get("pending_count"),
                responded_count: row.get("responded_count"),
                has_response: row.get::<i64, _>("has_response") != 0,
            })
        })
        .collect()
}

/// Apply a partial update; returns `None` if the group does not exist
pub async fn update_group(
    pool: &SqlitePool,
    id: Uuid,
    update: &GroupUpdate,
) -> Result<Option<RequestGroup>> {
    let Some(mut group) = load_group(pool, id).await? else {
        return Ok(None);
    };

    if let Some(title) = &update.title {
        group.title = title.trim().to_string();
    }
    if let Some(description) = &update.description {
        group.description = Some(description.clone());
    }
    if let Some(primary_tag_id) = update.primary_tag_id {
        group.primary_tag_id = primary_tag_id;
    }
    group.updated_at = time::now();

    sqlx::query(
        r#"
        UPDATE request_groups
        SET title = ?, description = ?, primary_tag_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&group.title)
    .bind(&group.description)
    .bind(group.primary_tag_id.map(|t| t.to_string()))
    .bind(time::to_column(&group.updated_at))
    .bind(group.id.to_string())
    .execute(pool)
    .await?;

    Ok(Some(group))
}

/// Number of responses addressed to a group
pub async fn count_group_responses(pool: &SqlitePool, id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE group_id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Delete the group row
///
/// Members must be detached first (see `requests::ungroup_members`).
pub async fn delete_group(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM request_groups WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
