//! Request database operations
//!
//! Single-row inserts and updates; no statement spans more than one table.

use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;
use reqdesk_common::db::{Request, RequestKind, RequestStatus};
use reqdesk_common::{time, uuid_utils, Error, Result};

use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const REQUEST_COLUMNS: &str =
    "id, owner_id, kind, title, body, status, group_id, created_at, updated_at";

/// Fields supplied on submission
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub owner_id: Uuid,
    pub kind: RequestKind,
    pub title: String,
    pub body: String,
}

/// Staff listing filter
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub kind: Option<RequestKind>,
    pub status: Option<RequestStatus>,
    pub owner_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

pub(crate) fn request_from_row(row: &SqliteRow) -> Result<Request> {
    let id: String = row.get("id");
    let owner_id: String = row.get("owner_id");
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let group_id: Option<String> = row.get("group_id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Request {
        id: uuid_utils::parse_column("requests.id", &id)?,
        owner_id: uuid_utils::parse_column("requests.owner_id", &owner_id)?,
        kind: kind.parse()?,
        title: row.get("title"),
        body: row.get("body"),
        status: status.parse()?,
        group_id: group_id
            .map(|g| uuid_utils::parse_column("requests.group_id", &g))
            .transpose()?,
        created_at: time::parse_column("requests.created_at", &created_at)?,
        updated_at: time::parse_column("requests.updated_at", &updated_at)?,
    })
}

/// Insert a new request in `Pending` status
pub async fn insert_request(pool: &SqlitePool, new: &NewRequest) -> Result<Request> {
    let now = time::now();
    let request = Request {
        id: uuid_utils::generate(),
        owner_id: new.owner_id,
        kind: new.kind,
        title: new.title.clone(),
        body: new.body.clone(),
        status: RequestStatus::Pending,
        group_id: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO requests (id, owner_id, kind, title, body, status, group_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)
        "#,
    )
    .bind(request.id.to_string())
    .bind(request.owner_id.to_string())
    .bind(request.kind.as_str())
    .bind(&request.title)
    .bind(&request.body)
    .bind(request.status.as_str())
    .bind(time::to_column(&now))
    .bind(time::to_column(&now))
    .execute(pool)
    .await?;

    Ok(request)
}

/// Load request by id
pub async fn load_request(pool: &SqlitePool, id: Uuid) -> Result<Option<Request>> {
    let row = sqlx::query(&format!("SELECT {} FROM requests WHERE id = ?", REQUEST_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(request_from_row).transpose()
}

/// Public requests eligible for a clustering pass
///
/// Status `analyzing`, no group, oldest first. The ordering is the stable
/// input order the pass iterates in.
pub async fn list_clustering_candidates(pool: &SqlitePool) -> Result<Vec<Request>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM requests
        WHERE kind = ? AND status = ? AND group_id IS NULL
        ORDER BY created_at ASC, id ASC
        "#,
        REQUEST_COLUMNS
    ))
    .bind(RequestKind::Public.as_str())
    .bind(RequestStatus::Analyzing.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}

/// Filtered listing, newest first
pub async fn list_requests(pool: &SqlitePool, filter: &RequestFilter) -> Result<Vec<Request>> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM requests WHERE 1 = 1", REQUEST_COLUMNS));

    if let Some(kind) = filter.kind {
        query.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(owner_id) = filter.owner_id {
        query.push(" AND owner_id = ").push_bind(owner_id.to_string());
    }

    query
        .push(" ORDER BY created_at DESC, id ASC LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(request_from_row).collect()
}

/// All requests owned by one caller, newest first
pub async fn list_requests_by_owner(pool: &SqlitePool, owner_id: Uuid) -> Result<Vec<Request>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM requests WHERE owner_id = ? ORDER BY created_at DESC, id ASC",
        REQUEST_COLUMNS
    ))
    .bind(owner_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}

/// Requests currently linked to a group
pub async fn list_group_members(pool: &SqlitePool, group_id: Uuid) -> Result<Vec<Request>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM requests WHERE group_id = ? ORDER BY created_at ASC, id ASC",
        REQUEST_COLUMNS
    ))
    .bind(group_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}

/// Set request status unconditionally
pub async fn update_status(pool: &SqlitePool, id: Uuid, status: RequestStatus) -> Result<()> {
    let id_str = id.to_string();

    let affected = retry_on_lock("update_request_status", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query("UPDATE requests SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(time::to_column(&time::now()))
            .bind(&id_str)
            .execute(pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    })
    .await?;

    if affected == 0 {
        return Err(Error::NotFound(format!("Request not found: {}", id)));
    }
    Ok(())
}

/// Move a request from `from` to `to` only if it is still in `from`
///
/// Returns false when the request had already moved on.
pub async fn advance_status(
    pool: &SqlitePool,
    id: Uuid,
    from: RequestStatus,
    to: RequestStatus,
) -> Result<bool> {
    let id_str = id.to_string();

    let affected = retry_on_lock("advance_request_status", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            "UPDATE requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(time::to_column(&time::now()))
        .bind(&id_str)
        .bind(from.as_str())
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    })
    .await?;

    Ok(affected > 0)
}

/// Re-parent a request into a group and mark it `Grouped`
pub async fn assign_group(pool: &SqlitePool, id: Uuid, group_id: Uuid) -> Result<()> {
    let id_str = id.to_string();
    let group_str = group_id.to_string();

    let affected = retry_on_lock("assign_request_group", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            "UPDATE requests SET group_id = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&group_str)
        .bind(RequestStatus::Grouped.as_str())
        .bind(time::to_column(&time::now()))
        .bind(&id_str)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    })
    .await?;

    if affected == 0 {
        return Err(Error::NotFound(format!("Request not found: {}", id)));
    }
    Ok(())
}

/// Detach every member from a group and return them to `Pending`
pub async fn ungroup_members(pool: &SqlitePool, group_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE requests SET group_id = NULL, status = ?, updated_at = ? WHERE group_id = ?",
    )
    .bind(RequestStatus::Pending.as_str())
    .bind(time::to_column(&time::now()))
    .bind(group_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqdesk_common::db::init_memory_database;

    fn public(owner: Uuid, title: &str) -> NewRequest {
        NewRequest {
            owner_id: owner,
            kind: RequestKind::Public,
            title: title.to_string(),
            body: "A body that is long enough to be valid".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_request() {
        let pool = init_memory_database().await.unwrap();
        let owner = Uuid::new_v4();

        let created = insert_request(&pool, &public(owner, "Need housing help")).await.unwrap();
        let loaded = load_request(&pool, created.id).await.unwrap().unwrap();

        assert_eq!(loaded.owner_id, owner);
        assert_eq!(loaded.status, RequestStatus::Pending);
        assert_eq!(loaded.kind, RequestKind::Public);
        assert!(loaded.group_id.is_none());
    }

    #[tokio::test]
    async fn test_candidates_exclude_grouped_direct_and_pending() {
        let pool = init_memory_database().await.unwrap();
        let owner = Uuid::new_v4();

        let analyzing = insert_request(&pool, &public(owner, "Analyzing one")).await.unwrap();
        advance_status(&pool, analyzing.id, RequestStatus::Pending, RequestStatus::Analyzing)
            .await
            .unwrap();

        let _pending = insert_request(&pool, &public(owner, "Still pending")).await.unwrap();

        let direct = insert_request(
            &pool,
            &NewRequest {
                kind: RequestKind::Direct,
                ..public(owner, "Direct one")
            },
        )
        .await
        .unwrap();
        update_status(&pool, direct.id, RequestStatus::Analyzing).await.unwrap();

        let candidates = list_clustering_candidates(&pool).await.unwrap();
        let ids: Vec<Uuid> = candidates.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![analyzing.id]);
    }

    #[tokio::test]
    async fn test_advance_status_only_from_expected_state() {
        let pool = init_memory_database().await.unwrap();
        let request = insert_request(&pool, &public(Uuid::new_v4(), "Advance me")).await.unwrap();

        assert!(advance_status(&pool, request.id, RequestStatus::Pending, RequestStatus::Analyzing)
            .await
            .unwrap());
        assert!(!advance_status(&pool, request.id, RequestStatus::Pending, RequestStatus::Analyzing)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_status_missing_request_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        let err = update_status(&pool, Uuid::new_v4(), RequestStatus::Responded)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_requests_filters_and_paginates() {
        let pool = init_memory_database().await.unwrap();
        let owner = Uuid::new_v4();
        for i in 0..3 {
            insert_request(
                &pool,
                &NewRequest {
                    kind: RequestKind::Direct,
                    ..public(owner, &format!("Direct request {}", i))
                },
            )
            .await
            .unwrap();
        }
        insert_request(&pool, &public(owner, "Public request")).await.unwrap();

        let filter = RequestFilter {
            kind: Some(RequestKind::Direct),
            limit: 2,
            ..Default::default()
        };
        let first_page = list_requests(&pool, &filter).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert!(first_page.iter().all(|r| r.kind == RequestKind::Direct));

        let second_page = list_requests(&pool, &RequestFilter { offset: 2, ..filter }).await.unwrap();
        assert_eq!(second_page.len(), 1);
    }
}
