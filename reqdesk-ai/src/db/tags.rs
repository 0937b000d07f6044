//! Tag and request-tag link database operations

use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;
use reqdesk_common::db::{RequestTagLink, Tag, TagCount, TagOrigin};
use reqdesk_common::{time, uuid_utils, Result};

const TAG_COLUMNS: &str = "id, name, localized_name, description, origin, created_at";

/// Fields for a new tag
#[derive(Debug, Clone)]
pub struct NewTag {
    pub name: String,
    pub localized_name: String,
    pub description: Option<String>,
    pub origin: TagOrigin,
}

/// Partial tag update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default)]
pub struct TagUpdate {
    pub name: Option<String>,
    pub localized_name: Option<String>,
    pub description: Option<String>,
}

fn tag_from_row(row: &SqliteRow) -> Result<Tag> {
    let id: String = row.get("id");
    let origin: String = row.get("origin");
    let created_at: String = row.get("created_at");

    Ok(Tag {
        id: uuid_utils::parse_column("tags.id", &id)?,
        name: row.get("name"),
        localized_name: row.get("localized_name"),
        description: row.get("description"),
        origin: origin.parse()?,
        created_at: time::parse_column("tags.created_at", &created_at)?,
    })
}

/// All tags, newest first
pub async fn list_tags(pool: &SqlitePool) -> Result<Vec<Tag>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM tags ORDER BY created_at DESC, name ASC",
        TAG_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(tag_from_row).collect()
}

pub async fn load_tag(pool: &SqlitePool, id: Uuid) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("SELECT {} FROM tags WHERE id = ?", TAG_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(tag_from_row).transpose()
}

/// Case-insensitive lookup by canonical name
pub async fn find_tag_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query(&format!("SELECT {} FROM tags WHERE name_key = ?", TAG_COLUMNS))
        .bind(Tag::name_key(name))
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(tag_from_row).transpose()
}

/// Insert a tag
///
/// Fails with a unique violation if the name exists in any letter case.
pub async fn insert_tag(pool: &SqlitePool, new: &NewTag) -> Result<Tag> {
    let tag = Tag {
        id: uuid_utils::generate(),
        name: new.name.trim().to_string(),
        localized_name: new.localized_name.trim().to_string(),
        description: new.description.clone(),
        origin: new.origin,
        created_at: time::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO tags (id, name, name_key, localized_name, description, origin, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tag.id.to_string())
    .bind(&tag.name)
    .bind(Tag::name_key(&tag.name))
    .bind(&tag.localized_name)
    .bind(&tag.description)
    .bind(tag.origin.as_str())
    .bind(time::to_column(&tag.created_at))
    .execute(pool)
    .await?;

    Ok(tag)
}

/// Apply a partial update; returns `None` if the tag does not exist
pub async fn update_tag(pool: &SqlitePool, id: Uuid, update: &TagUpdate) -> Result<Option<Tag>> {
    sqlx::query(
        r#"
        UPDATE tags SET
            name = COALESCE(?, name),
            name_key = COALESCE(?, name_key),
            localized_name = COALESCE(?, localized_name),
            description = COALESCE(?, description)
        WHERE id = ?
        "#,
    )
    .bind(update.name.as_deref().map(str::trim))
    .bind(update.name.as_deref().map(Tag::name_key))
    .bind(update.localized_name.as_deref().map(str::trim))
    .bind(&update.description)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    load_tag(pool, id).await
}

/// Delete a tag and its request links
///
/// Groups using it as primary tag fall back to no primary tag through the
/// `ON DELETE SET NULL` foreign key.
pub async fn delete_tag(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let id_str = id.to_string();

    sqlx::query("DELETE FROM request_tags WHERE tag_id = ?")
        .bind(&id_str)
        .execute(pool)
        .await?;

    let result = sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(&id_str)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Link a tag to a request
pub async fn insert_tag_link(
    pool: &SqlitePool,
    request_id: Uuid,
    tag_id: Uuid,
    confidence: i64,
) -> Result<RequestTagLink> {
    let link = RequestTagLink {
        id: uuid_utils::generate(),
        request_id,
        tag_id,
        confidence: confidence.clamp(0, 100),
        created_at: time::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO request_tags (id, request_id, tag_id, confidence, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(link.id.to_string())
    .bind(link.request_id.to_string())
    .bind(link.tag_id.to_string())
    .bind(link.confidence)
    .bind(time::to_column(&link.created_at))
    .execute(pool)
    .await?;

    Ok(link)
}

/// Tags linked to a request, in link order
pub async fn tags_for_request(pool: &SqlitePool, request_id: Uuid) -> Result<Vec<Tag>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name, t.localized_name, t.description, t.origin, t.created_at
        FROM request_tags rt
        JOIN tags t ON t.id = rt.tag_id
        WHERE rt.request_id = ?
        ORDER BY rt.rowid ASC
        "#,
    )
    .bind(request_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(tag_from_row).collect()
}

/// Raw tag-link counts over a set of requests
///
/// One entry per tag, ordered by the tag's first link (insertion order), so
/// callers resolving ties by "first encountered" get a deterministic answer.
pub async fn tag_link_counts(pool: &SqlitePool, request_ids: &[Uuid]) -> Result<Vec<TagCount>> {
    if request_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT tag_id, COUNT(*) AS link_count FROM request_tags WHERE request_id IN (");
    let mut separated = query.separated(", ");
    for id in request_ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(") GROUP BY tag_id ORDER BY MIN(rowid) ASC");

    let rows = query.build().fetch_all(pool).await?;

    rows.iter()
        .map(|row| {
            let tag_id: String = row.get("tag_id");
            Ok(TagCount {
                tag_id: uuid_utils::parse_column("request_tags.tag_id", &tag_id)?,
                count: row.get("link_count"),
            })
        })
        .collect()
}
