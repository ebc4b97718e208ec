//! Save transaction lifecycle
//!
//! ```text
//! Pending ──► DocumentWritten ──► BothWritten
//!    │               │
//!    │               ├──► RolledBack
//!    ▼               ▼
//!  Failed          Failed
//! ```
//!
//! BothWritten, RolledBack and Failed are terminal.

use crate::sinks::{DocumentRef, RowRef};
use chrono::{DateTime, Utc};
use reelmeta_common::Platform;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaveState {
    Pending,
    DocumentWritten,
    BothWritten,
    RolledBack,
    Failed,
}

impl SaveState {
    pub const TERMINAL: [SaveState; 3] = [SaveState::BothWritten, SaveState::RolledBack, SaveState::Failed];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    fn can_advance_to(&self, next: SaveState) -> bool {
        matches!(
            (self, next),
            (SaveState::Pending, SaveState::DocumentWritten)
                | (SaveState::Pending, SaveState::Failed)
                | (SaveState::DocumentWritten, SaveState::BothWritten)
                | (SaveState::DocumentWritten, SaveState::RolledBack)
                | (SaveState::DocumentWritten, SaveState::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid save transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: SaveState,
    pub to: SaveState,
}

/// Why a save did not reach BothWritten
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SaveError {
    #[error("Document write failed for {record_key}: {message}")]
    DocumentWriteFailed { record_key: String, message: String },

    /// Tabular write failed; the document was removed again
    #[error("Tabular write failed for {record_key}: {message}")]
    TabularWriteFailed { record_key: String, message: String },

    /// A document already exists for this record key; nothing was written
    #[error("Record {record_key} is already saved")]
    Duplicate { record_key: String },

    /// The save task ended before settling; sink state is unknown
    #[error("Save of {record_key} interrupted: {message}")]
    Interrupted { record_key: String, message: String },

    /// Tabular write failed and the document could not be removed
    #[error("Rollback failed for {record_key} (document {document_id}): {tabular_error}; delete: {rollback_error}")]
    SaveRollbackFailed {
        record_key: String,
        document_id: String,
        tabular_error: String,
        rollback_error: String,
    },
}

/// One record's trip through both sinks
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTransaction {
    pub id: Uuid,
    pub record_key: String,
    pub platform: Platform,
    pub document_ref: Option<DocumentRef>,
    pub tabular_ref: Option<RowRef>,
    state: SaveState,
    pub failure: Option<SaveError>,
    pub needs_reconciliation: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SaveTransaction {
    pub fn new(record_key: impl Into<String>, platform: Platform) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_key: record_key.into(),
            platform,
            document_ref: None,
            tabular_ref: None,
            state: SaveState::Pending,
            failure: None,
            needs_reconciliation: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    /// Move forward, stamping `finished_at` on terminal states
    pub fn advance(&mut self, next: SaveState) -> Result<(), TransitionError> {
        if !self.state.can_advance_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.state == SaveState::BothWritten
    }
}
