//! Hybrid extraction: concurrent strategies, isolation and deterministic merge

use async_trait::async_trait;
use chrono::Utc;
use reelmeta_common::{FieldName, FieldValue, Platform};
use reelmeta_ingest::extractors::HybridExtractor;
use reelmeta_ingest::quota::{Credential, CredentialPool, QuotaCosts, QuotaGovernor};
use reelmeta_ingest::types::{ExtractionError, ExtractionFailed, ExtractionStrategy, PartialRecord};
use std::sync::Arc;
use std::time::{Duration, Instant};

const URL: &str = "https://youtu.be/dQw4w9WgXcQ";

/// Returns fixed fields after a delay, or fails with the given error
struct Scripted {
    id: &'static str,
    delay_ms: u64,
    fields: Vec<(FieldName, FieldValue)>,
    error: Option<fn() -> ExtractionError>,
}

impl Scripted {
    fn ok(id: &'static str, delay_ms: u64, fields: Vec<(FieldName, FieldValue)>) -> Arc<dyn ExtractionStrategy> {
        Arc::new(Self {
            id,
            delay_ms,
            fields,
            error: None,
        })
    }

    fn failing(id: &'static str, error: fn() -> ExtractionError) -> Arc<dyn ExtractionStrategy> {
        Arc::new(Self {
            id,
            delay_ms: 0,
            fields: Vec::new(),
            error: Some(error),
        })
    }
}

#[async_trait]
impl ExtractionStrategy for Scripted {
    fn id(&self) -> &'static str {
        self.id
    }

    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn base_confidence(&self) -> f32 {
        0.6
    }

    async fn extract(&self, _url: &str) -> Result<PartialRecord, ExtractionError> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        if let Some(error) = self.error {
            return Err(error());
        }
        Ok(self
            .fields
            .iter()
            .fold(PartialRecord::new(self.id, Platform::YouTube, 0.6), |record, (field, value)| {
                record.with(*field, Some(value.clone()))
            }))
    }
}

/// Charges the quota governor before answering
struct Metered {
    quota: Arc<QuotaGovernor>,
}

#[async_trait]
impl ExtractionStrategy for Metered {
    fn id(&self) -> &'static str {
        "metered"
    }

    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn base_confidence(&self) -> f32 {
        0.9
    }

    async fn extract(&self, _url: &str) -> Result<PartialRecord, ExtractionError> {
        self.quota.acquire(1)?;
        Ok(PartialRecord::new("metered", Platform::YouTube, 0.9).with_count(FieldName::Likes, Some(10)))
    }
}

fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

fn extractor(strategies: Vec<Arc<dyn ExtractionStrategy>>) -> HybridExtractor {
    let mut extractor = HybridExtractor::new(Duration::from_millis(500));
    for strategy in strategies {
        extractor.register(strategy);
    }
    extractor
}

#[tokio::test]
async fn test_partial_success_attributes_fields() {
    let extractor = extractor(vec![
        Scripted::failing("a", || ExtractionError::Network("reset".into())),
        Scripted::ok(
            "b",
            0,
            vec![(FieldName::Title, text("Song")), (FieldName::Views, FieldValue::Count(1200))],
        ),
    ]);

    let record = extractor.extract(URL).await.unwrap();
    assert_eq!(record.key(), "youtube:dQw4w9WgXcQ");
    assert_eq!(record.get(FieldName::Title), Some(&text("Song")));
    assert_eq!(record.source_of(FieldName::Title), Some("b"));
    assert_eq!(record.source_of(FieldName::Views), Some("b"));
    assert!(record.get(FieldName::Likes).is_none());

    assert_eq!(record.strategy_failures().len(), 1);
    assert_eq!(record.strategy_failures()[0].strategy_id, "a");
    assert_eq!(record.strategy_failures()[0].kind, "network");
}

#[tokio::test]
async fn test_all_failed_carries_every_cause() {
    let extractor = extractor(vec![
        Scripted::failing("a", || ExtractionError::Network("reset".into())),
        Scripted::failing("b", || ExtractionError::NotFound("private".into())),
        Scripted::failing("c", || ExtractionError::Parse("bad json".into())),
    ]);

    match extractor.extract(URL).await {
        Err(ExtractionFailed::AllStrategiesFailed { causes, .. }) => {
            assert_eq!(causes.len(), 3);
            let ids: Vec<&str> = causes.iter().map(|c| c.strategy_id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b", "c"]);
        }
        other => panic!("expected AllStrategiesFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_strategy_times_out_without_blocking_others() {
    let extractor = extractor(vec![
        Scripted::ok("slow", 5_000, vec![(FieldName::Title, text("late"))]),
        Scripted::ok("fast", 10, vec![(FieldName::Title, text("early"))]),
    ]);

    let started = Instant::now();
    let record = extractor.extract(URL).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(record.get(FieldName::Title), Some(&text("early")));
    let failure = &record.strategy_failures()[0];
    assert_eq!(failure.strategy_id, "slow");
    assert_eq!(failure.kind, "timeout");
}

#[tokio::test]
async fn test_provenance_is_independent_of_settle_order() {
    let fields = |title: &str| vec![(FieldName::Title, text(title)), (FieldName::Views, FieldValue::Count(1))];

    for (first_delay, second_delay) in [(0, 80), (80, 0), (30, 30)] {
        let extractor = extractor(vec![
            Scripted::ok("first", first_delay, fields("from first")),
            Scripted::ok("second", second_delay, fields("from second")),
        ]);

        let record = extractor.extract(URL).await.unwrap();
        assert_eq!(record.get(FieldName::Title), Some(&text("from first")));
        assert_eq!(record.source_of(FieldName::Title), Some("first"));
        assert_eq!(record.source_of(FieldName::Views), Some("first"));
    }
}

#[tokio::test]
async fn test_field_priority_overrides_registration_order() {
    let mut extractor = extractor(vec![
        Scripted::ok("page", 0, vec![(FieldName::Likes, FieldValue::Count(5))]),
        Scripted::ok("api", 40, vec![(FieldName::Likes, FieldValue::Count(7))]),
    ]);
    extractor.set_field_priority(Platform::YouTube, FieldName::Likes, &["api", "page"]);

    let record = extractor.extract(URL).await.unwrap();
    assert_eq!(record.get(FieldName::Likes), Some(&FieldValue::Count(7)));
    assert_eq!(record.source_of(FieldName::Likes), Some("api"));
}

#[tokio::test]
async fn test_quota_exhaustion_is_a_strategy_failure() {
    let quota = Arc::new(QuotaGovernor::new(
        CredentialPool::new(vec![Credential::new("key-1", "only", "s", 1, 0, Utc::now())]),
        QuotaCosts::default(),
    ));
    let extractor = extractor(vec![
        Arc::new(Metered { quota: quota.clone() }),
        Scripted::ok("page", 0, vec![(FieldName::Title, text("t"))]),
    ]);

    let first = extractor.extract(URL).await.unwrap();
    assert_eq!(first.source_of(FieldName::Likes), Some("metered"));

    let second = extractor.extract(URL).await.unwrap();
    assert!(second.get(FieldName::Likes).is_none());
    assert_eq!(second.strategy_failures()[0].kind, "quota_exhausted");
    assert_eq!(second.source_of(FieldName::Title), Some("page"));
}

#[tokio::test]
async fn test_deadline_cancels_call() {
    let extractor = extractor(vec![Scripted::ok("slow", 400, vec![(FieldName::Title, text("t"))])]);

    let err = extractor
        .extract_with_deadline(URL, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionFailed::Cancelled { .. }));
}

#[tokio::test]
async fn test_unregistered_platform() {
    let extractor = extractor(vec![Scripted::ok("yt", 0, vec![])]);

    let err = extractor
        .extract("https://www.tiktok.com/@someone/video/7234567890123456789")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionFailed::NoStrategies(Platform::TikTok)));

    let err = extractor.extract("https://vimeo.com/1").await.unwrap_err();
    assert!(matches!(err, ExtractionFailed::UnsupportedUrl(_)));
}
