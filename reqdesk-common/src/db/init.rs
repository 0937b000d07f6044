//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates the request pipeline
//! schema. Every statement is idempotent, so this runs on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer (background tasks + handlers)
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    enable_foreign_keys(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// The pool holds exactly one connection that never expires: every new
/// connection to `sqlite::memory:` would otherwise see an empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    enable_foreign_keys(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn enable_foreign_keys(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    Ok(())
}

/// Create all pipeline tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_tags_table(pool).await?;
    create_request_groups_table(pool).await?;
    create_requests_table(pool).await?;
    create_request_tags_table(pool).await?;
    create_responses_table(pool).await?;
    create_personalized_responses_table(pool).await?;

    info!("Database schema ready (requests, tags, request_tags, request_groups, responses, personalized_responses)");

    Ok(())
}

/// Create the tags table
///
/// Uniqueness is enforced on `name_key` ([`crate::db::Tag::name_key`]) rather than a
/// collation; SQLite's NOCASE only folds ASCII.
pub async fn create_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE,
            localized_name TEXT NOT NULL,
            description TEXT,
            origin TEXT NOT NULL DEFAULT 'ai' CHECK (origin IN ('ai', 'admin')),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_request_groups_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_groups (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            primary_tag_id TEXT REFERENCES tags(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_requests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'public_request'
                CHECK (kind IN ('public_request', 'direct_request')),
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'analyzing', 'grouped', 'responded')),
            group_id TEXT REFERENCES request_groups(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Clustering candidate pool lookup
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_requests_kind_status_group ON requests(kind, status, group_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_owner ON requests(owner_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_request_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_tags (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL REFERENCES requests(id),
            tag_id TEXT NOT NULL REFERENCES tags(id),
            confidence INTEGER NOT NULL DEFAULT 100 CHECK (confidence BETWEEN 0 AND 100),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_request_tags_request ON request_tags(request_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_responses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            id TEXT PRIMARY KEY,
            request_id TEXT REFERENCES requests(id),
            group_id TEXT REFERENCES request_groups(id),
            responder_id TEXT NOT NULL,
            body TEXT NOT NULL,
            is_group_response INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            CHECK (
                (is_group_response = 1 AND group_id IS NOT NULL AND request_id IS NULL)
                OR (is_group_response = 0 AND request_id IS NOT NULL AND group_id IS NULL)
            )
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_personalized_responses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS personalized_responses (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL REFERENCES requests(id),
            response_id TEXT NOT NULL REFERENCES responses(id),
            body TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_personalized_responses_request ON personalized_responses(request_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
