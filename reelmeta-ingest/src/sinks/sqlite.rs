//! SQLite-backed sinks
//!
//! Documents live in one `documents` table as JSON bodies. Tabular rows go
//! to one `rows_<platform>` table per platform whose columns come from the
//! platform's [`TabularSchema`].

use super::{
    DocumentRef, DocumentSink, RowRef, SinkError, SinkFilter, StoredDocument, TabularRow, TabularSchema, TabularSink,
};
use crate::types::CanonicalRecord;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reelmeta_common::Platform;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed width so lexical order matches time order
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, SinkError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SinkError::Schema(format!("bad timestamp {:?}: {}", raw, e)))
}

fn duplicate_or(err: sqlx::Error, record_key: &str) -> SinkError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => SinkError::Duplicate(record_key.to_string()),
        other => SinkError::Database(other),
    }
}

pub struct SqliteDocumentSink {
    pool: SqlitePool,
}

impl SqliteDocumentSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the documents table if missing
    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                record_key TEXT NOT NULL,
                platform TEXT NOT NULL,
                url TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // One document per record key; replaces the older non-unique index
        sqlx::query("DROP INDEX IF EXISTS idx_documents_key").execute(pool).await?;
        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_record_key ON documents(record_key)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_recent ON documents(platform, created_at)")
            .execute(pool)
            .await?;

        Ok(())
    }

    fn to_document(row: &SqliteRow) -> Result<StoredDocument, SinkError> {
        let id: String = row.try_get("id")?;
        let body: String = row.try_get("body")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(StoredDocument {
            id: DocumentRef(id),
            record: serde_json::from_str(&body)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

#[async_trait]
impl DocumentSink for SqliteDocumentSink {
    fn name(&self) -> &'static str {
        "sqlite-documents"
    }

    async fn create(&self, record: &CanonicalRecord) -> Result<DocumentRef, SinkError> {
        let id = Uuid::new_v4().to_string();
        let body = serde_json::to_string(record)?;
        let now = timestamp(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO documents (id, record_key, platform, url, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(record.key())
        .bind(record.platform().as_str())
        .bind(record.url())
        .bind(&body)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, record.key()))?;

        Ok(DocumentRef(id))
    }

    async fn read(&self, id: &DocumentRef) -> Result<Option<StoredDocument>, SinkError> {
        let row = sqlx::query("SELECT id, body, created_at, updated_at FROM documents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::to_document).transpose()
    }

    async fn update(&self, id: &DocumentRef, record: &CanonicalRecord) -> Result<(), SinkError> {
        let body = serde_json::to_string(record)?;
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET record_key = ?, platform = ?, url = ?, body = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(record.key())
        .bind(record.platform().as_str())
        .bind(record.url())
        .bind(&body)
        .bind(timestamp(Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, record.key()))?;

        if result.rows_affected() == 0 {
            return Err(SinkError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &DocumentRef) -> Result<bool, SinkError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_key(&self, record_key: &str) -> Result<Option<StoredDocument>, SinkError> {
        let row = sqlx::query(
            r#"
            SELECT id, body, created_at, updated_at FROM documents
            WHERE record_key = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(record_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::to_document).transpose()
    }

    async fn recent_keys(&self, platform: Platform, limit: usize) -> Result<Vec<String>, SinkError> {
        let keys = sqlx::query_scalar::<_, String>(
            r#"
            SELECT record_key FROM documents
            WHERE platform = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(platform.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn count(&self, filter: &SinkFilter) -> Result<u64, SinkError> {
        let mut sql = String::from("SELECT COUNT(*) FROM documents WHERE 1 = 1");
        if filter.platform.is_some() {
            sql.push_str(" AND platform = ?");
        }
        if filter.record_key.is_some() {
            sql.push_str(" AND record_key = ?");
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(platform) = filter.platform {
            query = query.bind(platform.as_str());
        }
        if let Some(key) = &filter.record_key {
            query = query.bind(key.as_str());
        }

        let count = query.fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

pub struct SqliteTabularSink {
    pool: SqlitePool,
    /// Prepared INSERT text per platform, built once from the layout
    inserts: HashMap<Platform, String>,
}

impl SqliteTabularSink {
    pub fn new(pool: SqlitePool) -> Self {
        let inserts = Platform::ALL
            .iter()
            .map(|platform| {
                let schema = TabularSchema::for_platform(*platform);
                let names = schema.column_names();
                let columns = names.iter().map(|n| format!("\"{}\"", n)).collect::<Vec<_>>().join(", ");
                let placeholders = vec!["?"; names.len()].join(", ");
                (
                    *platform,
                    format!("INSERT INTO {} ({}) VALUES ({})", schema.table_name(), columns, placeholders),
                )
            })
            .collect();
        Self { pool, inserts }
    }

    /// Create one table per platform if missing
    pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        for platform in Platform::ALL {
            let schema = TabularSchema::for_platform(platform);
            let columns = schema
                .column_names()
                .iter()
                .map(|n| format!("\"{}\" TEXT NOT NULL DEFAULT ''", n))
                .collect::<Vec<_>>()
                .join(",\n    ");
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    row_id INTEGER PRIMARY KEY AUTOINCREMENT,\n    {}\n)",
                schema.table_name(),
                columns
            );
            sqlx::query(&ddl).execute(pool).await?;

            let index = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_key ON {table}(record_key)",
                table = schema.table_name()
            );
            sqlx::query(&index).execute(pool).await?;
        }
        Ok(())
    }

    async fn count_in(&self, platform: Platform, record_key: Option<&str>) -> Result<u64, SinkError> {
        let table = TabularSchema::for_platform(platform).table_name();
        let count = match record_key {
            Some(key) => {
                sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {} WHERE record_key = ?", table))
                    .bind(key)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl TabularSink for SqliteTabularSink {
    fn name(&self) -> &'static str {
        "sqlite-rows"
    }

    async fn append_row(&self, row: &TabularRow) -> Result<RowRef, SinkError> {
        let sql = self
            .inserts
            .get(&row.platform())
            .ok_or_else(|| SinkError::Schema(format!("no layout for {}", row.platform())))?;

        let mut query = sqlx::query(sql);
        for cell in row.cells() {
            query = query.bind(cell.as_str());
        }
        let result = query.execute(&self.pool).await?;

        Ok(RowRef {
            platform: row.platform(),
            row_id: result.last_insert_rowid(),
        })
    }

    async fn recent_keys(&self, platform: Platform, limit: usize) -> Result<Vec<String>, SinkError> {
        let table = TabularSchema::for_platform(platform).table_name();
        let keys = sqlx::query_scalar::<_, String>(&format!(
            "SELECT record_key FROM {} ORDER BY row_id DESC LIMIT ?",
            table
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn count(&self, filter: &SinkFilter) -> Result<u64, SinkError> {
        let platforms: Vec<Platform> = match filter.platform {
            Some(platform) => vec![platform],
            None => Platform::ALL.to_vec(),
        };

        let mut total = 0;
        for platform in platforms {
            total += self.count_in(platform, filter.record_key.as_deref()).await?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelmeta_common::{FieldName, FieldValue};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteDocumentSink::ensure_schema(&pool).await.unwrap();
        SqliteTabularSink::ensure_schema(&pool).await.unwrap();
        pool
    }

    fn record(key: &str) -> CanonicalRecord {
        let mut record = CanonicalRecord::new(key, Platform::TikTok, "https://www.tiktok.com/@a/video/1");
        record.offer(FieldName::Views, FieldValue::Count(99), "tiktok-page", |_, _| true);
        record
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let sink = SqliteDocumentSink::new(pool().await);
        let original = record("tiktok:1");
        let id = sink.create(&original).await.unwrap();

        let stored = sink.read(&id).await.unwrap().unwrap();
        assert_eq!(stored.record, original);
        assert_eq!(stored.record.source_of(FieldName::Views), Some("tiktok-page"));
        assert_eq!(sink.count(&SinkFilter::key(Platform::TikTok, "tiktok:1")).await.unwrap(), 1);

        assert!(sink.delete(&id).await.unwrap());
        assert!(sink.read(&id).await.unwrap().is_none());
        assert_eq!(sink.count(&SinkFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let sink = SqliteDocumentSink::new(pool().await);
        sink.create(&record("tiktok:1")).await.unwrap();

        let err = sink.create(&record("tiktok:1")).await.unwrap_err();
        assert!(matches!(err, SinkError::Duplicate(key) if key == "tiktok:1"));
        assert_eq!(sink.count(&SinkFilter::key(Platform::TikTok, "tiktok:1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let sink = SqliteDocumentSink::new(pool().await);
        let err = sink
            .update(&DocumentRef("nope".into()), &record("tiktok:1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rows_land_in_platform_table() {
        let pool = pool().await;
        let sink = SqliteTabularSink::new(pool.clone());

        for key in ["tiktok:1", "tiktok:2"] {
            sink.append_row(&TabularRow::from_record(&record(key))).await.unwrap();
        }

        assert_eq!(sink.recent_keys(Platform::TikTok, 10).await.unwrap(), vec!["tiktok:2", "tiktok:1"]);
        assert_eq!(sink.count(&SinkFilter::platform(Platform::YouTube)).await.unwrap(), 0);
        assert_eq!(sink.count(&SinkFilter::default()).await.unwrap(), 2);

        let views: String = sqlx::query_scalar("SELECT views FROM rows_tiktok WHERE record_key = 'tiktok:1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(views, "99");
    }
}
