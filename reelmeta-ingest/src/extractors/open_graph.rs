//! Page-metadata strategies
//!
//! Reads `<meta>` tags (Open Graph, `name=`, `itemprop=`) from public pages.
//! Used directly for Instagram and TikTok, and as the base of the YouTube
//! watch-page strategy.

use crate::types::{ExtractionError, ExtractionStrategy, PartialRecord};
use crate::url::ContentUrl;
use async_trait::async_trait;
use reelmeta_common::{FieldName, Platform};
use regex::Regex;
use reqwest::{header, Client, StatusCode};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::debug;

pub const INSTAGRAM_PAGE_ID: &str = "instagram-page";
pub const TIKTOK_PAGE_ID: &str = "tiktok-page";

/// Only the document head carries the tags we need
const HEAD_LIMIT: usize = 500_000;

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("valid meta regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid attribute regex")
});

/// "1,234 likes, 56 comments - someone on March 3, 2024: ..."
static INSTAGRAM_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*([\d.,]+\s*[kmb]?)\s+likes?,\s*([\d.,]+\s*[kmb]?)\s+comments?\s*-\s*([A-Za-z0-9._]+)\s+on\s+([^:]+?)\s*:",
    )
    .expect("valid instagram summary regex")
});

static TIKTOK_STATS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(playCount|diggCount|commentCount)"\s*:\s*"?(\d+)"#).expect("valid tiktok stats regex")
});

static TIKTOK_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""uniqueId"\s*:\s*"([^"]+)""#).expect("valid tiktok author regex"));

static TIKTOK_CREATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""createTime"\s*:\s*"?(\d{9,11})"#).expect("valid tiktok created regex"));

/// `<meta>` key/value pairs of a page, keyed by lower-cased
/// `property`, `name` or `itemprop`
#[derive(Debug, Default, Clone)]
pub struct PageMeta {
    tags: HashMap<String, String>,
}

impl PageMeta {
    pub fn parse(html: &str) -> Self {
        let head = head_section(html);
        let mut tags = HashMap::new();

        for tag in META_TAG.find_iter(head) {
            let mut key = None;
            let mut content = None;

            for cap in ATTRIBUTE.captures_iter(tag.as_str()) {
                let name = cap[1].to_ascii_lowercase();
                let value = cap
                    .get(2)
                    .or_else(|| cap.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match name.as_str() {
                    "property" | "name" | "itemprop" if key.is_none() => key = Some(value.to_ascii_lowercase()),
                    "content" => content = Some(decode_entities(value)),
                    _ => {}
                }
            }

            if let (Some(key), Some(content)) = (key, content) {
                // First occurrence wins
                tags.entry(key).or_insert(content);
            }
        }

        Self { tags }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn owned(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

fn head_section(html: &str) -> &str {
    let mut limit = html.len().min(HEAD_LIMIT);
    while !html.is_char_boundary(limit) {
        limit -= 1;
    }
    let bounded = &html[..limit];
    match bounded.find("</head>") {
        Some(end) => &bounded[..end],
        None => bounded,
    }
}

pub fn decode_entities(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Count with optional K/M/B suffix ("1,234", "1.2K", "3M")
pub fn parse_abbreviated_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    let (number, multiplier) = match cleaned.chars().last()?.to_ascii_lowercase() {
        'k' => (&cleaned[..cleaned.len() - 1], 1_000f64),
        'm' => (&cleaned[..cleaned.len() - 1], 1_000_000f64),
        'b' => (&cleaned[..cleaned.len() - 1], 1_000_000_000f64),
        _ => (cleaned.as_str(), 1f64),
    };
    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

/// GET a public page as text
pub(crate) async fn fetch_page(client: &Client, url: &str) -> Result<String, ExtractionError> {
    let response = client
        .get(url)
        .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ExtractionError::NotFound(url.to_string()));
    } else if !status.is_success() {
        return Err(ExtractionError::Api(format!("{} returned status {}", url, status)));
    }

    response
        .text()
        .await
        .map_err(|e| ExtractionError::Network(format!("reading page body: {}", e)))
}

fn require_platform(url: &str, platform: Platform) -> Result<ContentUrl, ExtractionError> {
    ContentUrl::parse(url)
        .filter(|u| u.platform == platform)
        .ok_or_else(|| ExtractionError::UnsupportedUrl(url.to_string()))
}

/// Instagram post/reel page
pub struct InstagramPageStrategy {
    client: Client,
}

impl InstagramPageStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionStrategy for InstagramPageStrategy {
    fn id(&self) -> &'static str {
        INSTAGRAM_PAGE_ID
    }

    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn base_confidence(&self) -> f32 {
        0.75
    }

    async fn extract(&self, url: &str) -> Result<PartialRecord, ExtractionError> {
        let start = Instant::now();
        let content = require_platform(url, Platform::Instagram)?;
        let html = fetch_page(&self.client, &content.normalized).await?;
        let record = instagram_from_meta(&PageMeta::parse(&html), self.base_confidence())?;
        debug!(url = %content.normalized, fields = record.field_count(), "Parsed Instagram page");
        Ok(record.with_latency(start.elapsed().as_millis() as u64))
    }
}

pub fn instagram_from_meta(meta: &PageMeta, confidence: f32) -> Result<PartialRecord, ExtractionError> {
    if meta.get("og:title").is_none() && meta.get("og:description").is_none() {
        // Login wall or removed post
        return Err(ExtractionError::NotFound("no Open Graph metadata on Instagram page".to_string()));
    }

    let mut record = PartialRecord::new(INSTAGRAM_PAGE_ID, Platform::Instagram, confidence)
        .with_text(FieldName::ThumbnailUrl, meta.owned("og:image"));

    let summary = meta.get("og:description").unwrap_or_default();
    match INSTAGRAM_SUMMARY.captures(summary) {
        Some(caps) => {
            let username = caps[3].to_string();
            let caption = summary[caps.get(0).map(|m| m.end()).unwrap_or(0)..]
                .trim()
                .trim_matches('"')
                .to_string();
            record = record
                .with_count(FieldName::Likes, parse_abbreviated_count(&caps[1]))
                .with_count(FieldName::CommentsCount, parse_abbreviated_count(&caps[2]))
                .with_text(FieldName::ChannelUrl, Some(format!("https://www.instagram.com/{}/", username)))
                .with_text(FieldName::ChannelName, Some(username))
                .with_text(FieldName::UploadDate, Some(caps[4].to_string()))
                .with_text(FieldName::Description, Some(caption));
        }
        None => {
            record = record.with_text(FieldName::Description, meta.owned("og:description"));
        }
    }

    // og:title looks like `Someone on Instagram: "caption"`
    let title = meta.get("og:title").map(|t| match t.split_once(": ") {
        Some((_, rest)) => rest.trim().trim_matches('"').to_string(),
        None => t.to_string(),
    });
    Ok(record.with_text(FieldName::Title, title))
}

/// TikTok video page
pub struct TikTokPageStrategy {
    client: Client,
}

impl TikTokPageStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionStrategy for TikTokPageStrategy {
    fn id(&self) -> &'static str {
        TIKTOK_PAGE_ID
    }

    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn base_confidence(&self) -> f32 {
        0.75
    }

    async fn extract(&self, url: &str) -> Result<PartialRecord, ExtractionError> {
        let start = Instant::now();
        let content = require_platform(url, Platform::TikTok)?;
        let html = fetch_page(&self.client, &content.normalized).await?;
        let record = tiktok_from_page(&html, self.base_confidence())?;
        debug!(url = %content.normalized, fields = record.field_count(), "Parsed TikTok page");
        Ok(record.with_latency(start.elapsed().as_millis() as u64))
    }
}

pub fn tiktok_from_page(html: &str, confidence: f32) -> Result<PartialRecord, ExtractionError> {
    let meta = PageMeta::parse(html);
    if meta.is_empty() && !TIKTOK_STATS.is_match(html) {
        return Err(ExtractionError::Parse("TikTok page carried no metadata".to_string()));
    }

    let mut stats: HashMap<&str, u64> = HashMap::new();
    for caps in TIKTOK_STATS.captures_iter(html) {
        if let (Some(name), Ok(value)) = (caps.get(1), caps[2].parse::<u64>()) {
            stats.entry(name.as_str()).or_insert(value);
        }
    }

    let author = TIKTOK_AUTHOR.captures(html).map(|c| c[1].to_string());
    let upload_date = TIKTOK_CREATED
        .captures(html)
        .and_then(|c| c[1].parse::<i64>().ok())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339());

    Ok(PartialRecord::new(TIKTOK_PAGE_ID, Platform::TikTok, confidence)
        .with_text(FieldName::Title, meta.owned("og:title"))
        .with_text(FieldName::Description, meta.owned("og:description").or_else(|| meta.owned("description")))
        .with_text(FieldName::ThumbnailUrl, meta.owned("og:image"))
        .with_text(FieldName::ChannelUrl, author.as_ref().map(|a| format!("https://www.tiktok.com/@{}", a)))
        .with_text(FieldName::ChannelName, author)
        .with_text(FieldName::UploadDate, upload_date)
        .with_count(FieldName::Views, stats.get("playCount").copied())
        .with_count(FieldName::Likes, stats.get("diggCount").copied())
        .with_count(FieldName::CommentsCount, stats.get("commentCount").copied()))
}
