//! YouTube watch-page strategy
//!
//! Unauthenticated, no quota. Reads the page's meta tags and a few values
//! from the embedded player response.

use super::open_graph::{decode_entities, fetch_page, PageMeta};
use super::youtube_api::parse_iso8601_duration;
use crate::types::{ExtractionError, ExtractionStrategy, PartialRecord};
use crate::url::ContentUrl;
use async_trait::async_trait;
use reelmeta_common::{FieldName, FieldValue, Platform};
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::debug;

pub const STRATEGY_ID: &str = "youtube-page";

static VIEW_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""viewCount"\s*:\s*"(\d+)""#).expect("valid view count regex"));

static OWNER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""ownerChannelName"\s*:\s*"([^"]+)""#).expect("valid owner regex"));

static CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""channelId"\s*:\s*"(UC[\w-]{22})""#).expect("valid channel id regex"));

static LENGTH_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""lengthSeconds"\s*:\s*"(\d+)""#).expect("valid length regex"));

pub struct YouTubePageStrategy {
    client: Client,
}

impl YouTubePageStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionStrategy for YouTubePageStrategy {
    fn id(&self) -> &'static str {
        STRATEGY_ID
    }

    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn base_confidence(&self) -> f32 {
        0.8
    }

    async fn extract(&self, url: &str) -> Result<PartialRecord, ExtractionError> {
        let start = Instant::now();
        let content = ContentUrl::parse(url)
            .filter(|u| u.platform == Platform::YouTube && u.content_id.is_some())
            .ok_or_else(|| ExtractionError::UnsupportedUrl(url.to_string()))?;

        let html = fetch_page(&self.client, &content.normalized).await?;
        let record = parse_watch_page(&html, self.base_confidence())?;
        debug!(url = %content.normalized, fields = record.field_count(), "Parsed YouTube watch page");
        Ok(record.with_latency(start.elapsed().as_millis() as u64))
    }
}

/// Fields from a watch page's HTML
pub fn parse_watch_page(html: &str, confidence: f32) -> Result<PartialRecord, ExtractionError> {
    let meta = PageMeta::parse(html);
    let title = meta.owned("og:title").or_else(|| meta.owned("title"));
    if title.is_none() {
        return Err(ExtractionError::NotFound("watch page has no title (removed or private)".to_string()));
    }

    let channel_id = capture(&CHANNEL_ID, html).or_else(|| meta.owned("channelid"));
    let channel_url = channel_id
        .as_ref()
        .map(|id| format!("https://www.youtube.com/channel/{}", id));

    let views = capture(&VIEW_COUNT, html)
        .or_else(|| meta.owned("interactioncount"))
        .and_then(|v| v.parse::<u64>().ok());

    let duration = meta
        .get("duration")
        .and_then(parse_iso8601_duration)
        .or_else(|| capture(&LENGTH_SECONDS, html).and_then(|s| s.parse().ok()));

    let keywords = meta
        .get("keywords")
        .map(|k| k.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>())
        .and_then(FieldValue::list);

    Ok(PartialRecord::new(STRATEGY_ID, Platform::YouTube, confidence)
        .with_text(FieldName::Title, title)
        .with_text(FieldName::Description, meta.owned("og:description").or_else(|| meta.owned("description")))
        .with_text(FieldName::ChannelName, capture(&OWNER_NAME, html).map(|n| decode_entities(&n)))
        .with_text(FieldName::ChannelId, channel_id)
        .with_text(FieldName::ChannelUrl, channel_url)
        .with_text(
            FieldName::UploadDate,
            meta.owned("uploaddate").or_else(|| meta.owned("datepublished")),
        )
        .with_count(FieldName::Duration, duration)
        .with_count(FieldName::Views, views)
        .with_text(FieldName::ThumbnailUrl, meta.owned("og:image"))
        .with(FieldName::Keywords, keywords)
        .with_text(FieldName::Category, meta.owned("genre")))
}

fn capture(re: &Regex, html: &str) -> Option<String> {
    re.captures(html).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATCH_PAGE: &str = r#"<html><head>
        <meta property="og:title" content="Building a Shed">
        <meta property="og:image" content="https://i.ytimg.com/vi/abc/maxresdefault.jpg">
        <meta name="keywords" content="diy, woodwork, shed">
        <meta itemprop="duration" content="PT12M5S">
        <meta itemprop="uploadDate" content="2024-02-10T08:00:00-08:00">
        <meta itemprop="genre" content="Howto &amp; Style">
        </head><body><script>var ytInitialPlayerResponse = {"videoDetails":{"channelId":"UCabcdefghijklmnopqrstuv","viewCount":"48213","ownerChannelName":"Weekend Builder"}};</script></body></html>"#;

    #[test]
    fn test_watch_page_fields() {
        let record = parse_watch_page(WATCH_PAGE, 0.8).unwrap();

        assert_eq!(record.get(FieldName::Title).and_then(|v| v.as_text()), Some("Building a Shed"));
        assert_eq!(record.get(FieldName::Views), Some(&FieldValue::Count(48_213)));
        assert_eq!(record.get(FieldName::Duration), Some(&FieldValue::Count(725)));
        assert_eq!(record.get(FieldName::ChannelName).and_then(|v| v.as_text()), Some("Weekend Builder"));
        assert_eq!(record.get(FieldName::Category).and_then(|v| v.as_text()), Some("Howto & Style"));
        assert_eq!(
            record.get(FieldName::Keywords),
            Some(&FieldValue::List(vec!["diy".into(), "woodwork".into(), "shed".into()]))
        );
        assert!(record.get(FieldName::Likes).is_none());
    }

    #[test]
    fn test_page_without_title_is_not_found() {
        let err = parse_watch_page("<html><head></head></html>", 0.8).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
