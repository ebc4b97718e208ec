//! oEmbed strategies (YouTube, TikTok)
//!
//! Public, unauthenticated, cheap. Only basic info: title, author, thumbnail.

use super::open_graph::fetch_page;
use crate::types::{ExtractionError, ExtractionStrategy, PartialRecord};
use crate::url::ContentUrl;
use async_trait::async_trait;
use reelmeta_common::{FieldName, Platform};
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;

pub const YOUTUBE_OEMBED_ID: &str = "youtube-oembed";
pub const TIKTOK_OEMBED_ID: &str = "tiktok-oembed";

const YOUTUBE_ENDPOINT: &str = "https://www.youtube.com/oembed";
const TIKTOK_ENDPOINT: &str = "https://www.tiktok.com/oembed";

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: Option<String>,
    author_name: Option<String>,
    author_url: Option<String>,
    thumbnail_url: Option<String>,
}

/// oEmbed lookup for one platform
pub struct OEmbedStrategy {
    id: &'static str,
    platform: Platform,
    endpoint: String,
    client: Client,
}

impl OEmbedStrategy {
    pub fn youtube(client: Client) -> Self {
        Self::with_endpoint(YOUTUBE_OEMBED_ID, Platform::YouTube, YOUTUBE_ENDPOINT, client)
    }

    pub fn tiktok(client: Client) -> Self {
        Self::with_endpoint(TIKTOK_OEMBED_ID, Platform::TikTok, TIKTOK_ENDPOINT, client)
    }

    pub fn with_endpoint(id: &'static str, platform: Platform, endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            id,
            platform,
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for OEmbedStrategy {
    fn id(&self) -> &'static str {
        self.id
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn base_confidence(&self) -> f32 {
        0.7
    }

    async fn extract(&self, url: &str) -> Result<PartialRecord, ExtractionError> {
        let start = Instant::now();
        let content = ContentUrl::parse(url)
            .filter(|u| u.platform == self.platform)
            .ok_or_else(|| ExtractionError::UnsupportedUrl(url.to_string()))?;

        let request = reqwest::Url::parse_with_params(
            &self.endpoint,
            &[("url", content.normalized.as_str()), ("format", "json")],
        )
        .map_err(|e| ExtractionError::Internal(format!("bad oEmbed endpoint: {}", e)))?;

        let body = fetch_page(&self.client, request.as_str()).await?;
        let record = parse_oembed(self.id, self.platform, &body, self.base_confidence())?;
        Ok(record.with_latency(start.elapsed().as_millis() as u64))
    }
}

pub fn parse_oembed(
    id: &'static str,
    platform: Platform,
    body: &str,
    confidence: f32,
) -> Result<PartialRecord, ExtractionError> {
    let response: OEmbedResponse =
        serde_json::from_str(body).map_err(|e| ExtractionError::Parse(format!("oEmbed response: {}", e)))?;

    Ok(PartialRecord::new(id, platform, confidence)
        .with_text(FieldName::Title, response.title)
        .with_text(FieldName::ChannelName, response.author_name)
        .with_text(FieldName::ChannelUrl, response.author_url)
        .with_text(FieldName::ThumbnailUrl, response.thumbnail_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelmeta_common::FieldValue;

    #[test]
    fn test_oembed_basic_fields() {
        let body = r#"{"title":"Cat video","author_name":"Cats Inc","author_url":"https://www.youtube.com/@cats","thumbnail_url":"https://i.ytimg.com/vi/x/hqdefault.jpg","type":"video"}"#;
        let record = parse_oembed(YOUTUBE_OEMBED_ID, Platform::YouTube, body, 0.7).unwrap();

        assert_eq!(record.field_count(), 4);
        assert_eq!(record.get(FieldName::ChannelName), Some(&FieldValue::Text("Cats Inc".into())));
        assert!(record.get(FieldName::Views).is_none());
    }

    #[test]
    fn test_oembed_garbage_is_parse_error() {
        let err = parse_oembed(TIKTOK_OEMBED_ID, Platform::TikTok, "<html>", 0.7).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}
