//! In-memory sinks for tests and ephemeral runs
//!
//! Both can be switched unavailable at runtime to exercise failure paths.

use super::{DocumentRef, DocumentSink, RowRef, SinkError, SinkFilter, StoredDocument, TabularRow, TabularSink};
use crate::types::CanonicalRecord;
use async_trait::async_trait;
use chrono::Utc;
use reelmeta_common::Platform;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryDocumentSink {
    /// Creation order, oldest first
    documents: RwLock<Vec<StoredDocument>>,
    unavailable: AtomicBool,
    deletes_failing: AtomicBool,
}

impl InMemoryDocumentSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every operation
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Refuse deletes only
    pub fn set_deletes_failing(&self, failing: bool) {
        self.deletes_failing.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check(&self) -> Result<(), SinkError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("in-memory document sink switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentSink for InMemoryDocumentSink {
    fn name(&self) -> &'static str {
        "memory-documents"
    }

    async fn create(&self, record: &CanonicalRecord) -> Result<DocumentRef, SinkError> {
        self.check()?;
        let mut documents = self.documents.write().await;
        if documents.iter().any(|d| d.record.key() == record.key()) {
            return Err(SinkError::Duplicate(record.key().to_string()));
        }

        let now = Utc::now();
        let id = DocumentRef(Uuid::new_v4().to_string());
        documents.push(StoredDocument {
            id: id.clone(),
            record: record.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn read(&self, id: &DocumentRef) -> Result<Option<StoredDocument>, SinkError> {
        self.check()?;
        Ok(self.documents.read().await.iter().find(|d| &d.id == id).cloned())
    }

    async fn update(&self, id: &DocumentRef, record: &CanonicalRecord) -> Result<(), SinkError> {
        self.check()?;
        let mut documents = self.documents.write().await;
        if documents.iter().any(|d| &d.id != id && d.record.key() == record.key()) {
            return Err(SinkError::Duplicate(record.key().to_string()));
        }
        let document = documents
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| SinkError::NotFound(id.to_string()))?;
        document.record = record.clone();
        document.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &DocumentRef) -> Result<bool, SinkError> {
        self.check()?;
        if self.deletes_failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("in-memory document sink refusing deletes".to_string()));
        }
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| &d.id != id);
        Ok(documents.len() < before)
    }

    async fn find_by_key(&self, record_key: &str) -> Result<Option<StoredDocument>, SinkError> {
        self.check()?;
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .rev()
            .find(|d| d.record.key() == record_key)
            .cloned())
    }

    async fn recent_keys(&self, platform: Platform, limit: usize) -> Result<Vec<String>, SinkError> {
        self.check()?;
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .rev()
            .filter(|d| d.record.platform() == platform)
            .take(limit)
            .map(|d| d.record.key().to_string())
            .collect())
    }

    async fn count(&self, filter: &SinkFilter) -> Result<u64, SinkError> {
        self.check()?;
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|d| filter.matches(d.record.platform(), d.record.key()))
            .count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryTabularSink {
    rows: RwLock<Vec<(i64, TabularRow)>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl InMemoryTabularSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Copy of every row, oldest first
    pub async fn rows(&self) -> Vec<TabularRow> {
        self.rows.read().await.iter().map(|(_, r)| r.clone()).collect()
    }

    fn check(&self) -> Result<(), SinkError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("in-memory tabular sink switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TabularSink for InMemoryTabularSink {
    fn name(&self) -> &'static str {
        "memory-rows"
    }

    async fn append_row(&self, row: &TabularRow) -> Result<RowRef, SinkError> {
        self.check()?;
        let row_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.write().await.push((row_id, row.clone()));
        Ok(RowRef {
            platform: row.platform(),
            row_id,
        })
    }

    async fn recent_keys(&self, platform: Platform, limit: usize) -> Result<Vec<String>, SinkError> {
        self.check()?;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .rev()
            .filter(|(_, r)| r.platform() == platform)
            .take(limit)
            .map(|(_, r)| r.record_key().to_string())
            .collect())
    }

    async fn count(&self, filter: &SinkFilter) -> Result<u64, SinkError> {
        self.check()?;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|(_, r)| filter.matches(r.platform(), r.record_key()))
            .count() as u64)
    }
}
