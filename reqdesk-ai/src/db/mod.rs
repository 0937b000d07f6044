//! Database access for reqdesk-ai
//!
//! One module per table family. Schema creation lives in
//! `reqdesk_common::db::init`.

pub mod groups;
pub mod requests;
pub mod responses;
pub mod tags;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the service database
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!(path = %db_path.display(), "Connecting to database");
    let pool = reqdesk_common::db::init_database(db_path).await?;

    Ok(pool)
}
