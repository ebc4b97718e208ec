//! Default strategy registration and priority tables

use super::oembed::{OEmbedStrategy, TIKTOK_OEMBED_ID, YOUTUBE_OEMBED_ID};
use super::open_graph::{InstagramPageStrategy, TikTokPageStrategy, TIKTOK_PAGE_ID};
use super::youtube_api::{self, YouTubeApiStrategy};
use super::youtube_page::{self, YouTubePageStrategy};
use super::HybridExtractor;
use crate::quota::QuotaGovernor;
use reelmeta_common::config::ExtractionSettings;
use reelmeta_common::{FieldName, Platform};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Fields where the page's numbers are fresher or richer than the API's
const PAGE_FIRST: [FieldName; 7] = [
    FieldName::Title,
    FieldName::Description,
    FieldName::ChannelName,
    FieldName::ThumbnailUrl,
    FieldName::Views,
    FieldName::Duration,
    FieldName::Keywords,
];

/// Fields where only the API is authoritative
const API_FIRST: [FieldName; 7] = [
    FieldName::UploadDate,
    FieldName::Category,
    FieldName::Likes,
    FieldName::CommentsCount,
    FieldName::Subscribers,
    FieldName::ChannelId,
    FieldName::Language,
];

/// HTTP client shared by every strategy
pub fn build_http_client(settings: &ExtractionSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(Duration::from_millis(settings.strategy_timeout_ms))
        .connect_timeout(Duration::from_secs(5))
        .build()
}

/// Extractor with every built-in strategy registered
///
/// The API strategy is only registered when the governor holds credentials.
pub fn default_extractor(
    settings: &ExtractionSettings,
    quota: Arc<QuotaGovernor>,
) -> Result<HybridExtractor, reqwest::Error> {
    let client = build_http_client(settings)?;
    let mut extractor = HybridExtractor::new(Duration::from_millis(settings.strategy_timeout_ms));

    // YouTube
    extractor.register(Arc::new(YouTubePageStrategy::new(client.clone())));
    if quota.has_credentials() {
        extractor.register(Arc::new(YouTubeApiStrategy::new(
            client.clone(),
            settings.youtube_api_base_url.clone(),
            Arc::clone(&quota),
            settings.api_requests_per_second,
        )));
    } else {
        warn!("No API credentials configured, YouTube Data API strategy disabled");
    }
    extractor.register(Arc::new(OEmbedStrategy::youtube(client.clone())));
    apply_youtube_priorities(&mut extractor);

    // Instagram
    extractor.register(Arc::new(InstagramPageStrategy::new(client.clone())));

    // TikTok
    extractor.register(Arc::new(TikTokPageStrategy::new(client.clone())));
    extractor.register(Arc::new(OEmbedStrategy::tiktok(client)));
    extractor.set_field_priority(
        Platform::TikTok,
        FieldName::ChannelName,
        &[TIKTOK_OEMBED_ID, TIKTOK_PAGE_ID],
    );

    for platform in Platform::ALL {
        let ids: Vec<&str> = extractor.strategies_for(platform).iter().map(|s| s.id()).collect();
        info!(platform = %platform, strategies = ?ids, "Extraction strategies ready");
    }

    Ok(extractor)
}

/// Page first for basic info and views; API first for dates, category and
/// engagement counts
pub fn apply_youtube_priorities(extractor: &mut HybridExtractor) {
    let page_first = [youtube_page::STRATEGY_ID, youtube_api::STRATEGY_ID, YOUTUBE_OEMBED_ID];
    let api_first = [youtube_api::STRATEGY_ID, youtube_page::STRATEGY_ID, YOUTUBE_OEMBED_ID];

    for field in PAGE_FIRST {
        extractor.set_field_priority(Platform::YouTube, field, &page_first);
    }
    for field in API_FIRST {
        extractor.set_field_priority(Platform::YouTube, field, &api_first);
    }
}
