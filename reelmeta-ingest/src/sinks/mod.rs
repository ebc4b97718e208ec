//! Persistence back-ends
//!
//! Two independent stores with different shapes:
//! - [`DocumentSink`]: one JSON document per canonical record, addressable by id
//! - [`TabularSink`]: append-only, fixed-column rows per platform
//!
//! Neither knows about the other; [`crate::saver::UnifiedSaver`] keeps them in step.

pub mod memory;
pub mod sqlite;
pub mod tabular;

pub use memory::{InMemoryDocumentSink, InMemoryTabularSink};
pub use sqlite::{SqliteDocumentSink, SqliteTabularSink};
pub use tabular::{Column, TabularRow, TabularSchema};

use crate::types::CanonicalRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelmeta_common::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable id of a stored document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(pub String);

impl DocumentRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of an appended row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRef {
    pub platform: Platform,
    pub row_id: i64,
}

/// Document as stored
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: DocumentRef,
    pub record: CanonicalRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Count filter; unset members match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkFilter {
    pub platform: Option<Platform>,
    pub record_key: Option<String>,
}

impl SinkFilter {
    pub fn platform(platform: Platform) -> Self {
        Self {
            platform: Some(platform),
            record_key: None,
        }
    }

    pub fn key(platform: Platform, record_key: impl Into<String>) -> Self {
        Self {
            platform: Some(platform),
            record_key: Some(record_key.into()),
        }
    }

    pub fn matches(&self, platform: Platform, record_key: &str) -> bool {
        self.platform.map_or(true, |p| p == platform)
            && self.record_key.as_deref().map_or(true, |k| k == record_key)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// Back-end cannot be reached or refuses writes
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    /// A document already exists for this record key
    #[error("Duplicate record key: {0}")]
    Duplicate(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row does not fit the platform's column layout
    #[error("Schema mismatch: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Document store: create/read/update/delete by id plus key lookups
#[async_trait]
pub trait DocumentSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Store a new document; [`SinkError::Duplicate`] if the key is taken
    async fn create(&self, record: &CanonicalRecord) -> Result<DocumentRef, SinkError>;

    async fn read(&self, id: &DocumentRef) -> Result<Option<StoredDocument>, SinkError>;

    /// Replace the record stored under `id`
    async fn update(&self, id: &DocumentRef, record: &CanonicalRecord) -> Result<(), SinkError>;

    /// Returns false when nothing was stored under `id`
    async fn delete(&self, id: &DocumentRef) -> Result<bool, SinkError>;

    /// Document stored for a record key
    async fn find_by_key(&self, record_key: &str) -> Result<Option<StoredDocument>, SinkError>;

    /// Record keys of the `limit` most recent documents, newest first
    ///
    /// Duplicates are kept so callers can detect them.
    async fn recent_keys(&self, platform: Platform, limit: usize) -> Result<Vec<String>, SinkError>;

    async fn count(&self, filter: &SinkFilter) -> Result<u64, SinkError>;
}

/// Spreadsheet-style store with one fixed column layout per platform
#[async_trait]
pub trait TabularSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn append_row(&self, row: &TabularRow) -> Result<RowRef, SinkError>;

    /// Record keys of the `limit` most recent rows, newest first
    async fn recent_keys(&self, platform: Platform, limit: usize) -> Result<Vec<String>, SinkError>;

    async fn count(&self, filter: &SinkFilter) -> Result<u64, SinkError>;
}
