//! YouTube Data API strategy
//!
//! The only strategy that touches the rate-limited upstream API. Each call
//! reserves quota through the [`QuotaGovernor`] before it is sent, and
//! requests are paced with a token bucket.
//!
//! # API Reference
//! - `GET /videos?part=snippet,statistics,contentDetails&id=...`
//! - `GET /channels?part=statistics&id=...` (best-effort subscriber count)

use crate::quota::{ApiOperation, CredentialGrant, QuotaGovernor};
use crate::types::{ExtractionError, ExtractionStrategy, PartialRecord};
use crate::url::ContentUrl;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reelmeta_common::{FieldName, FieldValue, Platform};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, warn};

pub const STRATEGY_ID: &str = "youtube-api";

const API_KEY_HEADER: &str = "X-Goog-Api-Key";

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("valid duration regex")
});

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    #[serde(default)]
    snippet: Option<VideoSnippet>,
    #[serde(default)]
    statistics: Option<VideoStatistics>,
    #[serde(default)]
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: Option<String>,
    description: Option<String>,
    channel_id: Option<String>,
    channel_title: Option<String>,
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
    #[serde(default)]
    tags: Vec<String>,
    category_id: Option<String>,
    default_language: Option<String>,
    default_audio_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Counts arrive as decimal strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    statistics: Option<ChannelStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    subscriber_count: Option<String>,
    #[serde(default)]
    hidden_subscriber_count: bool,
}

/// Authenticated YouTube Data API strategy
pub struct YouTubeApiStrategy {
    client: Client,
    base_url: String,
    quota: Arc<QuotaGovernor>,
    rate_limiter: DefaultDirectRateLimiter,
}

impl YouTubeApiStrategy {
    pub fn new(client: Client, base_url: impl Into<String>, quota: Arc<QuotaGovernor>, requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            quota,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    /// The key travels in a header so it never appears in a URL
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        grant: &CredentialGrant,
    ) -> Result<T, ExtractionError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .query(query)
            .header(API_KEY_HEADER, grant.secret.as_str())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ExtractionError::NotFound(format!("{} returned 404", path)));
        } else if status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api(format!(
                "{} rejected credential (403): {}",
                path,
                truncate(&body, 200)
            )));
        } else if !status.is_success() {
            return Err(ExtractionError::Api(format!("{} returned status {}", path, status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ExtractionError::Parse(format!("{} response: {}", path, e.without_url())))
    }

    /// Subscriber count for a channel. Any failure only drops the field.
    async fn subscribers(&self, channel_id: &str) -> Option<u64> {
        let grant = match self.quota.acquire_for(ApiOperation::ChannelLookup) {
            Ok(grant) => grant,
            Err(e) => {
                warn!(channel_id, error = %e, "Skipping subscriber lookup");
                return None;
            }
        };

        let query = [("part", "statistics"), ("id", channel_id)];
        match self.get_json::<ChannelListResponse>("channels", &query, &grant).await {
            Ok(response) => response
                .items
                .into_iter()
                .next()
                .and_then(|item| item.statistics)
                .filter(|stats| !stats.hidden_subscriber_count)
                .and_then(|stats| parse_count(stats.subscriber_count.as_deref())),
            Err(e) => {
                warn!(channel_id, error = %e, "Subscriber lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl ExtractionStrategy for YouTubeApiStrategy {
    fn id(&self) -> &'static str {
        STRATEGY_ID
    }

    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn base_confidence(&self) -> f32 {
        0.95
    }

    async fn extract(&self, url: &str) -> Result<PartialRecord, ExtractionError> {
        let start = Instant::now();
        let video_id = ContentUrl::parse(url)
            .filter(|u| u.platform == Platform::YouTube)
            .and_then(|u| u.content_id)
            .ok_or_else(|| ExtractionError::UnsupportedUrl(url.to_string()))?;

        let grant = self.quota.acquire_for(ApiOperation::VideoLookup)?;
        debug!(video_id = %video_id, credential = %grant.credential_id, "Querying YouTube Data API");

        let query = [("part", "snippet,statistics,contentDetails"), ("id", video_id.as_str())];
        let response: VideoListResponse = self.get_json("videos", &query, &grant).await?;

        let item = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ExtractionError::NotFound(format!("video {} not found or private", video_id)))?;

        let channel_id = item.snippet.as_ref().and_then(|s| s.channel_id.clone());
        let mut record = video_to_partial(item, self.base_confidence());

        if let Some(channel_id) = channel_id {
            let subscribers = self.subscribers(&channel_id).await;
            record = record.with_count(FieldName::Subscribers, subscribers);
        }

        Ok(record.with_latency(start.elapsed().as_millis() as u64))
    }
}

fn video_to_partial(item: VideoItem, confidence: f32) -> PartialRecord {
    let mut record = PartialRecord::new(STRATEGY_ID, Platform::YouTube, confidence);

    if let Some(snippet) = item.snippet {
        let thumbnail = ["maxres", "standard", "high", "medium", "default"]
            .iter()
            .find_map(|size| snippet.thumbnails.get(*size))
            .map(|t| t.url.clone());
        let channel_url = snippet
            .channel_id
            .as_ref()
            .map(|id| format!("https://www.youtube.com/channel/{}", id));
        let language = snippet.default_language.or(snippet.default_audio_language);

        record = record
            .with_text(FieldName::Title, snippet.title)
            .with_text(FieldName::Description, snippet.description)
            .with_text(FieldName::ChannelName, snippet.channel_title)
            .with_text(FieldName::ChannelId, snippet.channel_id)
            .with_text(FieldName::ChannelUrl, channel_url)
            .with_text(FieldName::UploadDate, snippet.published_at)
            .with_text(FieldName::ThumbnailUrl, thumbnail)
            .with(FieldName::Keywords, FieldValue::list(snippet.tags))
            .with_text(FieldName::Category, snippet.category_id.as_deref().map(category_name))
            .with_text(FieldName::Language, language);
    }

    if let Some(stats) = item.statistics {
        record = record
            .with_count(FieldName::Views, parse_count(stats.view_count.as_deref()))
            .with_count(FieldName::Likes, parse_count(stats.like_count.as_deref()))
            .with_count(FieldName::CommentsCount, parse_count(stats.comment_count.as_deref()));
    }

    if let Some(details) = item.content_details {
        record = record.with_count(
            FieldName::Duration,
            details.duration.as_deref().and_then(parse_iso8601_duration),
        );
    }

    record
}

fn parse_count(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse().ok())
}

/// `PT1H2M3S` → 3723 seconds
pub fn parse_iso8601_duration(raw: &str) -> Option<u64> {
    let caps = ISO_DURATION.captures(raw.trim())?;
    if (1..=4).all(|i| caps.get(i).is_none()) {
        return None;
    }

    // Out-of-range components make the whole value unusable
    let mut total: u64 = 0;
    for (idx, unit) in [(1, 86_400u64), (2, 3_600), (3, 60), (4, 1)] {
        let Some(m) = caps.get(idx) else { continue };
        let value: u64 = m.as_str().parse().ok()?;
        total = total.checked_add(value.checked_mul(unit)?)?;
    }
    Some(total)
}

/// English name for a YouTube video category id
pub fn category_name(category_id: &str) -> String {
    let name = match category_id {
        "1" => "Film & Animation",
        "2" => "Autos & Vehicles",
        "10" => "Music",
        "15" => "Pets & Animals",
        "17" => "Sports",
        "19" => "Travel & Events",
        "20" => "Gaming",
        "22" => "People & Blogs",
        "23" => "Comedy",
        "24" => "Entertainment",
        "25" => "News & Politics",
        "26" => "Howto & Style",
        "27" => "Education",
        "28" => "Science & Technology",
        "29" => "Nonprofits & Activism",
        other => return format!("Category {}", other),
    };
    name.to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "items": [{
            "id": "dQw4w9WgXcQ",
            "snippet": {
                "title": "Never Gonna Give You Up",
                "description": "Official video",
                "channelId": "UCuAXFkgsw1L7xaCfnd5JJOw",
                "channelTitle": "Rick Astley",
                "publishedAt": "2009-10-25T06:57:33Z",
                "thumbnails": {
                    "default": {"url": "https://i.ytimg.com/vi/x/default.jpg"},
                    "high": {"url": "https://i.ytimg.com/vi/x/hqdefault.jpg"}
                },
                "tags": ["rick astley", "80s"],
                "categoryId": "10",
                "defaultAudioLanguage": "en"
            },
            "statistics": {"viewCount": "1500000000", "likeCount": "17000000", "commentCount": "2300000"},
            "contentDetails": {"duration": "PT3M33S"}
        }]
    }"#;

    #[test]
    fn test_video_response_maps_to_fields() {
        let response: VideoListResponse = serde_json::from_str(SAMPLE).unwrap();
        let item = response.items.into_iter().next().unwrap();
        let record = video_to_partial(item, 0.95);

        assert_eq!(record.strategy_id(), STRATEGY_ID);
        assert_eq!(record.get(FieldName::Views), Some(&FieldValue::Count(1_500_000_000)));
        assert_eq!(record.get(FieldName::Duration), Some(&FieldValue::Count(213)));
        assert_eq!(record.get(FieldName::Category).and_then(|v| v.as_text()), Some("Music"));
        assert_eq!(record.get(FieldName::Language).and_then(|v| v.as_text()), Some("en"));
        assert_eq!(
            record.get(FieldName::ThumbnailUrl).and_then(|v| v.as_text()),
            Some("https://i.ytimg.com/vi/x/hqdefault.jpg")
        );
        assert_eq!(
            record.get(FieldName::ChannelUrl).and_then(|v| v.as_text()),
            Some("https://www.youtube.com/channel/UCuAXFkgsw1L7xaCfnd5JJOw")
        );
        assert!(record.get(FieldName::Subscribers).is_none());
    }

    #[test]
    fn test_missing_statistics_leave_fields_absent() {
        let response: VideoListResponse =
            serde_json::from_str(r#"{"items":[{"snippet":{"title":"Only title"}}]}"#).unwrap();
        let record = video_to_partial(response.items.into_iter().next().unwrap(), 0.95);
        assert_eq!(record.field_count(), 1);
        assert!(record.get(FieldName::Views).is_none());
    }

    #[test]
    fn test_iso_durations() {
        assert_eq!(parse_iso8601_duration("PT15M33S"), Some(933));
        assert_eq!(parse_iso8601_duration("PT1H"), Some(3600));
        assert_eq!(parse_iso8601_duration("P1DT2S"), Some(86_402));
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("15:33"), None);
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        assert_eq!(parse_iso8601_duration("P99999999999999999D"), None);
        assert_eq!(parse_iso8601_duration("PT99999999999999999999S"), None);
        assert_eq!(parse_iso8601_duration("P1DT18446744073709551615S"), None);
        assert_eq!(parse_iso8601_duration("PT18446744073709551615S"), Some(u64::MAX));
    }

    const SECRET: &str = "SECRETKEY123";

    fn metered_strategy(base_url: String) -> YouTubeApiStrategy {
        use crate::quota::{Credential, CredentialPool, QuotaCosts};

        let quota = Arc::new(QuotaGovernor::new(
            CredentialPool::new(vec![Credential::new("key-1", "only", SECRET, 100, 0, chrono::Utc::now())]),
            QuotaCosts::default(),
        ));
        YouTubeApiStrategy::new(Client::new(), base_url, quota, 50)
    }

    #[tokio::test]
    async fn test_key_sent_as_header_not_query() {
        use axum::{extract::RawQuery, http::HeaderMap, routing::get, Router};
        use std::sync::Mutex;

        let seen: Arc<Mutex<Vec<(String, Option<String>)>>> = Arc::default();
        let recorder = seen.clone();
        let app = Router::new().route(
            "/videos",
            get(move |RawQuery(query): RawQuery, headers: HeaderMap| {
                let recorder = recorder.clone();
                async move {
                    let key = headers
                        .get(API_KEY_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    recorder.lock().unwrap().push((query.unwrap_or_default(), key));
                    "not json"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let strategy = metered_strategy(format!("http://{}", addr));
        let err = strategy.extract("https://youtu.be/dQw4w9WgXcQ").await.unwrap_err();

        assert!(matches!(err, ExtractionError::Parse(_)));
        assert!(!err.to_string().contains(SECRET), "{}", err);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("id=dQw4w9WgXcQ"));
        assert!(!seen[0].0.contains(SECRET));
        assert_eq!(seen[0].1.as_deref(), Some(SECRET));
    }

    #[tokio::test]
    async fn test_network_failure_message_has_no_key() {
        // Nothing listens on the discard port
        let strategy = metered_strategy("http://127.0.0.1:9".to_string());
        let err = strategy.extract("https://youtu.be/dQw4w9WgXcQ").await.unwrap_err();

        assert!(matches!(err, ExtractionError::Network(_)));
        assert!(!err.to_string().contains(SECRET), "{}", err);
    }

    #[test]
    fn test_unknown_category_keeps_id() {
        assert_eq!(category_name("42"), "Category 42");
    }
}
