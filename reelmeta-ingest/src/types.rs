//! Core types for multi-strategy extraction
//!
//! - [`ExtractionStrategy`]: one platform-specific way of reading metadata
//! - [`PartialRecord`]: what one strategy invocation produced
//! - [`CanonicalRecord`]: merged result with per-field provenance
//! - Error taxonomy for single-strategy and whole-call failures

use crate::quota::QuotaExhausted;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelmeta_common::{FieldName, FieldValue, Platform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Platform-specific metadata source
///
/// Implementations hold no per-call state. Strategies that talk to the
/// rate-limited API reserve quota themselves before each upstream call.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Stable strategy id, used for provenance and priority tables
    fn id(&self) -> &'static str;

    fn platform(&self) -> Platform;

    /// Baseline confidence of this source (0.0-1.0)
    fn base_confidence(&self) -> f32;

    /// Read whatever fields this source can provide for `url`
    async fn extract(&self, url: &str) -> Result<PartialRecord, ExtractionError>;
}

/// Output of one strategy invocation
///
/// Built with the `with_*` methods and read-only once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    strategy_id: &'static str,
    platform: Platform,
    fields: BTreeMap<FieldName, FieldValue>,
    confidence: f32,
    latency_ms: u64,
}

impl PartialRecord {
    pub fn new(strategy_id: &'static str, platform: Platform, confidence: f32) -> Self {
        Self {
            strategy_id,
            platform,
            fields: BTreeMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
            latency_ms: 0,
        }
    }

    /// Set a field; `None` leaves it absent
    pub fn with(mut self, field: FieldName, value: Option<FieldValue>) -> Self {
        match value {
            Some(value) => {
                self.fields.insert(field, value);
            }
            None => {
                self.fields.remove(&field);
            }
        }
        self
    }

    pub fn with_text(self, field: FieldName, value: Option<impl Into<String>>) -> Self {
        self.with(field, value.and_then(FieldValue::text))
    }

    pub fn with_count(self, field: FieldName, value: Option<u64>) -> Self {
        self.with(field, value.map(FieldValue::Count))
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn strategy_id(&self) -> &'static str {
        self.strategy_id
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldName, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One strategy failed
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered with an error
    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Content does not exist or is private
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    #[error(transparent)]
    QuotaExhausted(#[from] QuotaExhausted),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractionError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::Network(_) => "network",
            ExtractionError::Api(_) => "api",
            ExtractionError::Parse(_) => "parse",
            ExtractionError::NotFound(_) => "not_found",
            ExtractionError::UnsupportedUrl(_) => "unsupported_url",
            ExtractionError::QuotaExhausted(_) => "quota_exhausted",
            ExtractionError::Timeout(_) => "timeout",
            ExtractionError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for ExtractionError {
    /// The URL is dropped: request URLs may carry credentials.
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            ExtractionError::Parse(err.to_string())
        } else {
            ExtractionError::Network(err.to_string())
        }
    }
}

/// Diagnostic record of one failed strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyFailure {
    pub strategy_id: String,
    pub kind: String,
    pub message: String,
}

impl StrategyFailure {
    pub fn new(strategy_id: &str, error: &ExtractionError) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// The whole extraction call failed
#[derive(Debug, Error)]
pub enum ExtractionFailed {
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    #[error("No strategies registered for {0}")]
    NoStrategies(Platform),

    #[error("All {} strategies failed for {url}", causes.len())]
    AllStrategiesFailed {
        url: String,
        causes: Vec<StrategyFailure>,
    },

    #[error("Extraction cancelled for {url}")]
    Cancelled { url: String },
}

impl ExtractionFailed {
    /// Per-strategy causes (empty unless every strategy failed)
    pub fn causes(&self) -> &[StrategyFailure] {
        match self {
            ExtractionFailed::AllStrategiesFailed { causes, .. } => causes,
            _ => &[],
        }
    }
}

/// Category and tags supplied by an external classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Merged record for one content item
///
/// Every present field has a provenance entry naming the strategy that
/// supplied it. Fields change only through [`CanonicalRecord::offer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    key: String,
    platform: Platform,
    url: String,
    fields: BTreeMap<FieldName, FieldValue>,
    provenance: BTreeMap<FieldName, String>,
    #[serde(default)]
    strategy_failures: Vec<StrategyFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    classification: Option<Classification>,
    created_at: DateTime<Utc>,
}

impl CanonicalRecord {
    pub fn new(key: impl Into<String>, platform: Platform, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            platform,
            url: url.into(),
            fields: BTreeMap::new(),
            provenance: BTreeMap::new(),
            strategy_failures: Vec::new(),
            classification: None,
            created_at: Utc::now(),
        }
    }

    /// Offer a value for `field` from `strategy_id`
    ///
    /// `outranks(candidate, holder)` must return true when `candidate` has
    /// equal or higher priority than `holder`. Returns whether the value was
    /// taken.
    pub fn offer<F>(&mut self, field: FieldName, value: FieldValue, strategy_id: &str, outranks: F) -> bool
    where
        F: Fn(&str, &str) -> bool,
    {
        if let Some(holder) = self.provenance.get(&field) {
            if !outranks(strategy_id, holder) {
                return false;
            }
        }
        self.fields.insert(field, value);
        self.provenance.insert(field, strategy_id.to_string());
        true
    }

    pub fn record_failure(&mut self, failure: StrategyFailure) {
        self.strategy_failures.push(failure);
    }

    pub fn set_classification(&mut self, classification: Classification) {
        self.classification = Some(classification);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldName, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Strategy that supplied `field`, if present
    pub fn source_of(&self, field: FieldName) -> Option<&str> {
        self.provenance.get(&field).map(String::as_str)
    }

    pub fn provenance(&self) -> &BTreeMap<FieldName, String> {
        &self.provenance
    }

    pub fn strategy_failures(&self) -> &[StrategyFailure] {
        &self.strategy_failures
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    /// Share of the platform's applicable fields that are present (0.0-1.0)
    pub fn completeness(&self) -> f32 {
        let applicable: Vec<FieldName> = FieldName::ALL
            .iter()
            .copied()
            .filter(|f| f.applies_to(self.platform))
            .collect();
        if applicable.is_empty() {
            return 0.0;
        }
        let present = applicable.iter().filter(|f| self.fields.contains_key(f)).count();
        present as f32 / applicable.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reqwest_error_drops_url() {
        // Unsupported scheme fails before any connection is attempted
        let err = reqwest::Client::new()
            .get("ftp://example.test/videos?key=SECRETKEY123")
            .send()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SECRETKEY123"));

        let converted = ExtractionError::from(err);
        assert!(!converted.to_string().contains("SECRETKEY123"), "{}", converted);
    }

    fn always(_: &str, _: &str) -> bool {
        true
    }

    fn never(_: &str, _: &str) -> bool {
        false
    }

    #[test]
    fn test_partial_record_absent_fields() {
        let record = PartialRecord::new("a", Platform::YouTube, 0.9)
            .with_text(FieldName::Title, Some("Hello"))
            .with_text(FieldName::Description, Some("  "))
            .with_count(FieldName::Views, None);

        assert_eq!(record.field_count(), 1);
        assert!(record.get(FieldName::Description).is_none());
        assert!(record.get(FieldName::Views).is_none());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(PartialRecord::new("a", Platform::TikTok, 1.7).confidence(), 1.0);
    }

    #[test]
    fn test_offer_respects_holder() {
        let mut record = CanonicalRecord::new("youtube:abc", Platform::YouTube, "https://youtu.be/abc");
        assert!(record.offer(FieldName::Title, FieldValue::Text("first".into()), "a", never));
        assert!(!record.offer(FieldName::Title, FieldValue::Text("second".into()), "b", never));
        assert_eq!(record.source_of(FieldName::Title), Some("a"));

        assert!(record.offer(FieldName::Title, FieldValue::Text("third".into()), "c", always));
        assert_eq!(record.get(FieldName::Title).and_then(|v| v.as_text()), Some("third"));
        assert_eq!(record.source_of(FieldName::Title), Some("c"));
    }

    #[test]
    fn test_every_field_has_provenance() {
        let mut record = CanonicalRecord::new("tiktok:1", Platform::TikTok, "https://www.tiktok.com/@a/video/1");
        record.offer(FieldName::Views, FieldValue::Count(3), "x", always);
        record.offer(FieldName::Title, FieldValue::Text("t".into()), "y", always);
        for (field, _) in record.fields() {
            assert!(record.source_of(field).is_some());
        }
    }

    #[test]
    fn test_completeness_uses_platform_fields() {
        let mut record = CanonicalRecord::new("instagram:x", Platform::Instagram, "https://www.instagram.com/p/x/");
        assert_eq!(record.completeness(), 0.0);
        for field in FieldName::ALL.iter().filter(|f| f.applies_to(Platform::Instagram)) {
            record.offer(*field, FieldValue::Count(1), "s", always);
        }
        assert!((record.completeness() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_all_failed_message_counts_causes() {
        let err = ExtractionFailed::AllStrategiesFailed {
            url: "u".into(),
            causes: vec![
                StrategyFailure::new("a", &ExtractionError::Timeout(10)),
                StrategyFailure::new("b", &ExtractionError::Network("down".into())),
            ],
        };
        assert_eq!(err.causes().len(), 2);
        assert!(err.to_string().contains("All 2 strategies failed"));
        assert_eq!(err.causes()[0].kind, "timeout");
    }

    #[test]
    fn test_record_json_round_trip_keeps_provenance() {
        let mut record = CanonicalRecord::new("youtube:abc", Platform::YouTube, "https://youtu.be/abc");
        record.offer(FieldName::Views, FieldValue::Count(10), "youtube-api", always);
        record.set_classification(Classification {
            category: "Music".into(),
            tags: vec!["live".into()],
        });

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"views\":10"));
        let back: CanonicalRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
