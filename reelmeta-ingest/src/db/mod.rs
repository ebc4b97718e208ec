//! Database access for reelmeta-ingest
//!
//! Both concrete sinks share one SQLite file in the root folder.

use crate::sinks::{SqliteDocumentSink, SqliteTabularSink};
use reelmeta_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the document table and one row table per platform
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    SqliteDocumentSink::ensure_schema(pool).await?;
    SqliteTabularSink::ensure_schema(pool).await?;

    tracing::info!("Database tables initialized (documents, rows_*)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_file_and_tables() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("reelmeta.db");

        let pool = init_database_pool(&db_path).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"rows_youtube".to_string()));
        assert!(tables.contains(&"rows_tiktok".to_string()));

        // Second run is a no-op
        init_tables(&pool).await.unwrap();
    }
}
