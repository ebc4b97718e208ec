//! Dual-sink persistence
//!
//! [`UnifiedSaver`] writes each canonical record to the document sink, then to
//! the tabular sink. When the second write fails the document is deleted
//! again; when that delete also fails the transaction is kept on a
//! reconciliation list for an operator.

pub mod consistency;
pub mod transaction;

pub use consistency::{ConsistencyReport, ConsistencyValidator, RepairFailure, RepairReport};
pub use transaction::{SaveError, SaveState, SaveTransaction, TransitionError};

use crate::sinks::{DocumentRef, DocumentSink, SinkError, TabularRow, TabularSink};
use crate::types::CanonicalRecord;
use crate::utils::retry_with_backoff;
use reelmeta_common::config::SaverSettings;
use reelmeta_common::Platform;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Counts of settled transactions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStatistics {
    pub platform: Option<Platform>,
    pub total: u64,
    pub both_written: u64,
    pub rolled_back: u64,
    pub failed: u64,
    pub pending_reconciliation: usize,
}

#[derive(Default)]
struct SaveLedger {
    settled: HashMap<(Platform, SaveState), u64>,
    reconciliation: Vec<SaveTransaction>,
}

pub struct UnifiedSaver {
    writer: Arc<SaveWriter>,
    workers: Arc<Semaphore>,
    validator: ConsistencyValidator,
}

/// Sink pair and ledger, shared with in-flight save tasks
struct SaveWriter {
    documents: Arc<dyn DocumentSink>,
    tabular: Arc<dyn TabularSink>,
    rollback_attempts: u32,
    rollback_backoff: Duration,
    ledger: Mutex<SaveLedger>,
}

impl UnifiedSaver {
    pub fn new(
        documents: Arc<dyn DocumentSink>,
        tabular: Arc<dyn TabularSink>,
        max_concurrent_saves: usize,
        rollback_attempts: u32,
        rollback_backoff: Duration,
    ) -> Self {
        let validator = ConsistencyValidator::new(documents.clone(), tabular.clone());
        Self {
            writer: Arc::new(SaveWriter {
                documents,
                tabular,
                rollback_attempts: rollback_attempts.max(1),
                rollback_backoff,
                ledger: Mutex::new(SaveLedger::default()),
            }),
            workers: Arc::new(Semaphore::new(max_concurrent_saves.max(1))),
            validator,
        }
    }

    pub fn from_settings(
        settings: &SaverSettings,
        documents: Arc<dyn DocumentSink>,
        tabular: Arc<dyn TabularSink>,
    ) -> Self {
        Self::new(
            documents,
            tabular,
            settings.max_concurrent_saves,
            settings.rollback_attempts,
            Duration::from_millis(settings.rollback_backoff_ms),
        )
    }

    /// Persist one record to both sinks
    ///
    /// Always returns a transaction in a terminal state; failures are carried
    /// in [`SaveTransaction::failure`].
    ///
    /// The writes run on their own task. A caller that stops waiting does not
    /// stop the transaction: it still settles into the statistics and, when
    /// its rollback fails, into the reconciliation list.
    pub async fn save(&self, record: CanonicalRecord) -> SaveTransaction {
        let record_key = record.key().to_string();
        let platform = record.platform();

        // The semaphore is never closed
        let permit = self.workers.clone().acquire_owned().await.ok();
        let writer = self.writer.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let tx = writer.write_both(&record).await;
            writer.settle(&tx);
            tx
        });

        match handle.await {
            Ok(tx) => tx,
            Err(join_error) => {
                // The document may or may not have been written
                error!(record_key = %record_key, error = %join_error, "Save task aborted");
                let mut tx = SaveTransaction::new(record_key.clone(), platform);
                tx.failure = Some(SaveError::Interrupted {
                    record_key,
                    message: join_error.to_string(),
                });
                tx.needs_reconciliation = true;
                step(&mut tx, SaveState::Failed);
                self.writer.settle(&tx);
                tx
            }
        }
    }

    /// Save records concurrently, bounded by the worker pool
    ///
    /// Transactions come back in input order.
    pub async fn save_batch(&self, records: Vec<CanonicalRecord>) -> Vec<SaveTransaction> {
        let count = records.len();
        let transactions = futures::future::join_all(records.into_iter().map(|r| self.save(r))).await;

        let written = transactions.iter().filter(|t| t.is_complete()).count();
        info!(count, written, "Batch save finished");
        transactions
    }

    /// Per-terminal-state counts, for one platform or all
    pub fn get_save_statistics(&self, platform: Option<Platform>) -> SaveStatistics {
        let ledger = self.writer.ledger();
        let mut stats = SaveStatistics {
            platform,
            ..Default::default()
        };

        for ((p, state), n) in &ledger.settled {
            if platform.is_some_and(|want| want != *p) {
                continue;
            }
            stats.total += n;
            match state {
                SaveState::BothWritten => stats.both_written += n,
                SaveState::RolledBack => stats.rolled_back += n,
                SaveState::Failed => stats.failed += n,
                SaveState::Pending | SaveState::DocumentWritten => {}
            }
        }
        stats.pending_reconciliation = ledger
            .reconciliation
            .iter()
            .filter(|tx| platform.map_or(true, |want| want == tx.platform))
            .count();
        stats
    }

    /// Transactions whose rollback failed, oldest first
    pub fn pending_reconciliation(&self) -> Vec<SaveTransaction> {
        self.writer.ledger().reconciliation.clone()
    }

    /// Drop a transaction from the reconciliation list once handled
    pub fn resolve_reconciliation(&self, id: uuid::Uuid) -> bool {
        let mut ledger = self.writer.ledger();
        let before = ledger.reconciliation.len();
        ledger.reconciliation.retain(|tx| tx.id != id);
        ledger.reconciliation.len() < before
    }

    pub async fn validate_data_consistency(
        &self,
        platform: Platform,
        sample_size: usize,
    ) -> Result<ConsistencyReport, SinkError> {
        self.validator.validate(platform, sample_size).await
    }

    pub async fn repair_consistency(&self, platform: Platform, sample_size: usize) -> Result<RepairReport, SinkError> {
        self.validator.repair(platform, sample_size).await
    }
}

impl SaveWriter {
    async fn write_both(&self, record: &CanonicalRecord) -> SaveTransaction {
        let mut tx = SaveTransaction::new(record.key(), record.platform());

        let document_ref = match self.documents.create(record).await {
            Ok(document_ref) => document_ref,
            Err(SinkError::Duplicate(_)) => {
                warn!(record_key = %tx.record_key, sink = self.documents.name(), "Record already saved");
                tx.failure = Some(SaveError::Duplicate {
                    record_key: tx.record_key.clone(),
                });
                step(&mut tx, SaveState::Failed);
                return tx;
            }
            Err(e) => {
                warn!(record_key = %tx.record_key, sink = self.documents.name(), error = %e, "Document write failed");
                tx.failure = Some(SaveError::DocumentWriteFailed {
                    record_key: tx.record_key.clone(),
                    message: e.to_string(),
                });
                step(&mut tx, SaveState::Failed);
                return tx;
            }
        };
        tx.document_ref = Some(document_ref.clone());
        step(&mut tx, SaveState::DocumentWritten);

        let row = TabularRow::from_record(record);
        match self.tabular.append_row(&row).await {
            Ok(row_ref) => {
                debug!(record_key = %tx.record_key, document = %document_ref, row_id = row_ref.row_id, "Record saved to both sinks");
                tx.tabular_ref = Some(row_ref);
                step(&mut tx, SaveState::BothWritten);
            }
            Err(tabular_error) => {
                warn!(
                    record_key = %tx.record_key,
                    sink = self.tabular.name(),
                    error = %tabular_error,
                    "Tabular write failed, rolling back document"
                );
                self.roll_back(&mut tx, &document_ref, tabular_error).await;
            }
        }

        tx
    }

    async fn roll_back(&self, tx: &mut SaveTransaction, document_ref: &DocumentRef, tabular_error: SinkError) {
        let deleted = retry_with_backoff("document rollback", self.rollback_attempts, self.rollback_backoff, || {
            self.documents.delete(document_ref)
        })
        .await;

        match deleted {
            Ok(_) => {
                tx.failure = Some(SaveError::TabularWriteFailed {
                    record_key: tx.record_key.clone(),
                    message: tabular_error.to_string(),
                });
                step(tx, SaveState::RolledBack);
                info!(record_key = %tx.record_key, document = %document_ref, "Document rolled back");
            }
            Err(rollback_error) => {
                error!(
                    record_key = %tx.record_key,
                    document_id = %document_ref,
                    tabular_error = %tabular_error,
                    rollback_error = %rollback_error,
                    "Rollback failed; sinks diverge until reconciled"
                );
                tx.failure = Some(SaveError::SaveRollbackFailed {
                    record_key: tx.record_key.clone(),
                    document_id: document_ref.to_string(),
                    tabular_error: tabular_error.to_string(),
                    rollback_error: rollback_error.to_string(),
                });
                tx.needs_reconciliation = true;
                step(tx, SaveState::Failed);
            }
        }
    }

    fn ledger(&self) -> MutexGuard<'_, SaveLedger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle(&self, tx: &SaveTransaction) {
        let mut ledger = self.ledger();
        *ledger.settled.entry((tx.platform, tx.state())).or_default() += 1;
        if tx.needs_reconciliation {
            ledger.reconciliation.push(tx.clone());
        }
    }
}

fn step(tx: &mut SaveTransaction, next: SaveState) {
    if let Err(e) = tx.advance(next) {
        error!(record_key = %tx.record_key, error = %e, "Save transaction out of order");
    }
}
