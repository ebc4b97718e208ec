//! Cross-sink consistency audit
//!
//! Compares the most recent records of both sinks for one platform. The audit
//! only reads; [`ConsistencyValidator::repair`] is the separate write path.
//!
//! A key seen in one sample but not the other is confirmed with a per-key
//! count before it is reported, so records that merely fell outside the other
//! sink's sample window are not flagged.

use crate::sinks::{DocumentSink, SinkError, SinkFilter, TabularRow, TabularSink};
use chrono::{DateTime, Utc};
use reelmeta_common::Platform;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub platform: Platform,
    pub sample_size: usize,
    /// Keys sampled from the document sink
    pub sink_a_count: usize,
    /// Keys sampled from the tabular sink
    pub sink_b_count: usize,
    pub document_total: u64,
    pub tabular_total: u64,
    pub consistent: bool,
    /// Union of `only_in_documents` and `only_in_tabular`, sorted
    pub mismatched_keys: Vec<String>,
    pub only_in_documents: Vec<String>,
    pub only_in_tabular: Vec<String>,
    /// Keys seen more than once within either sample
    pub duplicate_keys: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairFailure {
    pub record_key: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub platform: Platform,
    /// Keys that received a tabular row
    pub repaired_keys: Vec<String>,
    /// Keys with no document to rebuild a row from
    pub unresolved_keys: Vec<String>,
    pub failed: Vec<RepairFailure>,
    /// Audit the repair was planned from
    pub before: ConsistencyReport,
}

pub struct ConsistencyValidator {
    documents: Arc<dyn DocumentSink>,
    tabular: Arc<dyn TabularSink>,
}

impl ConsistencyValidator {
    pub fn new(documents: Arc<dyn DocumentSink>, tabular: Arc<dyn TabularSink>) -> Self {
        Self { documents, tabular }
    }

    pub async fn validate(&self, platform: Platform, sample_size: usize) -> Result<ConsistencyReport, SinkError> {
        let document_keys = self.documents.recent_keys(platform, sample_size).await?;
        let row_keys = self.tabular.recent_keys(platform, sample_size).await?;

        let document_set: BTreeSet<&str> = document_keys.iter().map(String::as_str).collect();
        let row_set: BTreeSet<&str> = row_keys.iter().map(String::as_str).collect();

        let mut only_in_documents = Vec::new();
        for key in document_set.difference(&row_set) {
            if self.tabular.count(&SinkFilter::key(platform, *key)).await? == 0 {
                only_in_documents.push(key.to_string());
            }
        }

        let mut only_in_tabular = Vec::new();
        for key in row_set.difference(&document_set) {
            if self.documents.count(&SinkFilter::key(platform, *key)).await? == 0 {
                only_in_tabular.push(key.to_string());
            }
        }

        let mut duplicates = duplicates_in(&document_keys);
        duplicates.extend(duplicates_in(&row_keys));

        let document_total = self.documents.count(&SinkFilter::platform(platform)).await?;
        let tabular_total = self.tabular.count(&SinkFilter::platform(platform)).await?;

        let mismatched_keys: Vec<String> = only_in_documents
            .iter()
            .chain(only_in_tabular.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let consistent = mismatched_keys.is_empty() && document_total == tabular_total;

        let report = ConsistencyReport {
            platform,
            sample_size,
            sink_a_count: document_keys.len(),
            sink_b_count: row_keys.len(),
            document_total,
            tabular_total,
            consistent,
            mismatched_keys,
            only_in_documents,
            only_in_tabular,
            duplicate_keys: duplicates.into_iter().collect(),
            checked_at: Utc::now(),
        };

        if report.consistent {
            debug!(
                platform = %platform,
                sampled = report.sink_a_count,
                "Sinks consistent"
            );
        } else {
            warn!(
                platform = %platform,
                document_total,
                tabular_total,
                mismatched = report.mismatched_keys.len(),
                "Sinks inconsistent"
            );
        }

        Ok(report)
    }

    /// Append rows for documents missing from the tabular sink
    ///
    /// Tabular-only keys cannot be rebuilt and are reported as unresolved.
    /// Running it twice appends nothing the second time.
    pub async fn repair(&self, platform: Platform, sample_size: usize) -> Result<RepairReport, SinkError> {
        let before = self.validate(platform, sample_size).await?;

        let mut repaired_keys = Vec::new();
        let mut unresolved_keys = before.only_in_tabular.clone();
        let mut failed = Vec::new();

        for key in &before.only_in_documents {
            let document = match self.documents.find_by_key(key).await? {
                Some(document) => document,
                None => {
                    unresolved_keys.push(key.clone());
                    continue;
                }
            };

            match self.tabular.append_row(&TabularRow::from_record(&document.record)).await {
                Ok(row) => {
                    info!(record_key = %key, row_id = row.row_id, "Repaired missing tabular row");
                    repaired_keys.push(key.clone());
                }
                Err(e) => {
                    warn!(record_key = %key, error = %e, "Tabular repair failed");
                    failed.push(RepairFailure {
                        record_key: key.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        unresolved_keys.sort();

        Ok(RepairReport {
            platform,
            repaired_keys,
            unresolved_keys,
            failed,
            before,
        })
    }
}

fn duplicates_in(keys: &[String]) -> BTreeSet<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        *seen.entry(key.as_str()).or_default() += 1;
    }
    seen.into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(k, _)| k.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{InMemoryDocumentSink, InMemoryTabularSink};
    use crate::types::CanonicalRecord;

    fn record(key: &str) -> CanonicalRecord {
        CanonicalRecord::new(key, Platform::TikTok, format!("https://www.tiktok.com/v/{}.html", key))
    }

    async fn seeded() -> (Arc<InMemoryDocumentSink>, Arc<InMemoryTabularSink>, ConsistencyValidator) {
        let documents = Arc::new(InMemoryDocumentSink::new());
        let tabular = Arc::new(InMemoryTabularSink::new());
        for key in ["tiktok:1", "tiktok:2"] {
            documents.create(&record(key)).await.unwrap();
            tabular.append_row(&TabularRow::from_record(&record(key))).await.unwrap();
        }
        let validator = ConsistencyValidator::new(documents.clone(), tabular.clone());
        (documents, tabular, validator)
    }

    #[tokio::test]
    async fn test_matching_sinks_are_consistent() {
        let (_, _, validator) = seeded().await;
        let report = validator.validate(Platform::TikTok, 10).await.unwrap();

        assert!(report.consistent);
        assert_eq!(report.sink_a_count, 2);
        assert_eq!(report.sink_b_count, 2);
        assert!(report.mismatched_keys.is_empty());
    }

    #[tokio::test]
    async fn test_document_only_key_reported() {
        let (documents, _, validator) = seeded().await;
        documents.create(&record("tiktok:3")).await.unwrap();

        let report = validator.validate(Platform::TikTok, 10).await.unwrap();
        assert!(!report.consistent);
        assert_eq!(report.only_in_documents, vec!["tiktok:3"]);
        assert_eq!(report.mismatched_keys, vec!["tiktok:3"]);
        assert_eq!(report.document_total, 3);
        assert_eq!(report.tabular_total, 2);
    }

    #[tokio::test]
    async fn test_key_outside_other_sample_is_not_flagged() {
        let documents = Arc::new(InMemoryDocumentSink::new());
        let tabular = Arc::new(InMemoryTabularSink::new());
        // Rows land in the opposite order, so a sample of 1 differs per sink
        documents.create(&record("tiktok:1")).await.unwrap();
        documents.create(&record("tiktok:2")).await.unwrap();
        tabular.append_row(&TabularRow::from_record(&record("tiktok:2"))).await.unwrap();
        tabular.append_row(&TabularRow::from_record(&record("tiktok:1"))).await.unwrap();

        let validator = ConsistencyValidator::new(documents, tabular);
        let report = validator.validate(Platform::TikTok, 1).await.unwrap();
        assert!(report.consistent);
        assert!(report.mismatched_keys.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rows_detected() {
        let (_, tabular, validator) = seeded().await;
        tabular.append_row(&TabularRow::from_record(&record("tiktok:2"))).await.unwrap();

        let report = validator.validate(Platform::TikTok, 10).await.unwrap();
        assert_eq!(report.duplicate_keys, vec!["tiktok:2"]);
        assert!(report.mismatched_keys.is_empty());
        // An extra row still leaves the totals apart
        assert!(!report.consistent);
        assert_eq!((report.document_total, report.tabular_total), (2, 3));
    }

    #[tokio::test]
    async fn test_validate_does_not_write() {
        let (documents, tabular, validator) = seeded().await;
        documents.create(&record("tiktok:3")).await.unwrap();

        let first = validator.validate(Platform::TikTok, 10).await.unwrap();
        let second = validator.validate(Platform::TikTok, 10).await.unwrap();
        assert_eq!(first.mismatched_keys, second.mismatched_keys);
        assert_eq!(tabular.rows().await.len(), 2);
    }

    #[tokio::test]
    async fn test_repair_appends_missing_rows_once() {
        let (documents, tabular, validator) = seeded().await;
        documents.create(&record("tiktok:3")).await.unwrap();
        tabular.append_row(&TabularRow::from_record(&record("tiktok:9"))).await.unwrap();

        let first = validator.repair(Platform::TikTok, 10).await.unwrap();
        assert_eq!(first.repaired_keys, vec!["tiktok:3"]);
        assert_eq!(first.unresolved_keys, vec!["tiktok:9"]);
        assert!(first.failed.is_empty());

        let second = validator.repair(Platform::TikTok, 10).await.unwrap();
        assert!(second.repaired_keys.is_empty());
        assert_eq!(second.unresolved_keys, vec!["tiktok:9"]);
        assert_eq!(tabular.rows().await.len(), 4);
    }

    #[tokio::test]
    async fn test_repair_with_unavailable_sink_errors() {
        let (documents, tabular, validator) = seeded().await;
        documents.create(&record("tiktok:3")).await.unwrap();

        tabular.set_unavailable(true);
        let err = validator.repair(Platform::TikTok, 10).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
        assert_eq!(documents.len().await, 3);
    }
}
