//! Content URL normalization and record keys

use reelmeta_common::Platform;
use url::Url;

/// Parsed content URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUrl {
    pub platform: Platform,
    /// Platform content id (video id, shortcode), when the URL carries one
    pub content_id: Option<String>,
    /// Canonical form of the URL
    pub normalized: String,
}

impl ContentUrl {
    /// Parse and normalize a content URL
    ///
    /// Returns `None` when the URL is unparseable or the host is not a
    /// supported platform.
    pub fn parse(raw: &str) -> Option<ContentUrl> {
        let platform = Platform::detect(raw)?;
        let parsed = Url::parse(raw.trim()).ok()?;

        let content_id = match platform {
            Platform::YouTube => youtube_id(&parsed),
            Platform::Instagram => instagram_shortcode(&parsed).map(|(_, code)| code),
            Platform::TikTok => tiktok_id(&parsed),
        };

        let normalized = match (platform, &content_id) {
            (Platform::YouTube, Some(id)) => format!("https://www.youtube.com/watch?v={}", id),
            (Platform::Instagram, Some(_)) => match instagram_shortcode(&parsed) {
                Some((kind, code)) => format!("https://www.instagram.com/{}/{}/", kind, code),
                None => strip_query(&parsed),
            },
            _ => strip_query(&parsed),
        };

        Some(ContentUrl {
            platform,
            content_id,
            normalized,
        })
    }

    /// Stable record key (`youtube:<id>`, falling back to the normalized URL)
    pub fn record_key(&self) -> String {
        match &self.content_id {
            Some(id) => format!("{}:{}", self.platform.slug(), id),
            None => format!("{}:{}", self.platform.slug(), self.normalized),
        }
    }
}

fn valid_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn youtube_id(url: &Url) -> Option<String> {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let segments = path_segments(url);

    let candidate = if host.ends_with("youtu.be") {
        segments.first().map(|s| s.to_string())
    } else if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        Some(v.into_owned())
    } else {
        match segments.as_slice() {
            ["shorts" | "embed" | "live" | "v", id, ..] => Some(id.to_string()),
            _ => None,
        }
    };

    candidate.filter(|id| valid_id(id))
}

fn instagram_shortcode(url: &Url) -> Option<(&'static str, String)> {
    let segments = path_segments(url);
    let (kind, code) = match segments.as_slice() {
        ["p", code, ..] => ("p", *code),
        ["reel" | "reels", code, ..] => ("reel", *code),
        ["tv", code, ..] => ("tv", *code),
        // Profile-scoped post links: /<user>/p/<code>/
        [_, "p", code, ..] => ("p", *code),
        [_, "reel", code, ..] => ("reel", *code),
        _ => return None,
    };
    valid_id(code).then(|| (kind, code.to_string()))
}

fn tiktok_id(url: &Url) -> Option<String> {
    let segments = path_segments(url);
    let candidate = match segments.as_slice() {
        [user, "video" | "photo", id, ..] if user.starts_with('@') => Some(*id),
        ["v", id, ..] => Some(id.trim_end_matches(".html")),
        _ => None,
    }?;
    (!candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit())).then(|| candidate.to_string())
}

fn strip_query(url: &Url) -> String {
    let mut cleaned = url.clone();
    cleaned.set_query(None);
    cleaned.set_fragment(None);
    cleaned.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> Option<String> {
        ContentUrl::parse(raw).map(|u| u.record_key())
    }

    #[test]
    fn test_youtube_variants_share_a_key() {
        let expected = Some("youtube:dQw4w9WgXcQ".to_string());
        assert_eq!(key("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"), expected);
        assert_eq!(key("https://youtu.be/dQw4w9WgXcQ?si=abc"), expected);
        assert_eq!(key("https://youtube.com/shorts/dQw4w9WgXcQ"), expected);
        assert_eq!(key("https://m.youtube.com/embed/dQw4w9WgXcQ"), expected);
    }

    #[test]
    fn test_youtube_normalized_form() {
        let parsed = ContentUrl::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(parsed.normalized, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(parsed.platform, Platform::YouTube);
    }

    #[test]
    fn test_instagram_shortcodes() {
        assert_eq!(key("https://www.instagram.com/reel/Cx1_ab-Z/?igsh=1"), Some("instagram:Cx1_ab-Z".into()));
        let post = ContentUrl::parse("https://instagram.com/p/ABC123/").unwrap();
        assert_eq!(post.normalized, "https://www.instagram.com/p/ABC123/");
        let reels = ContentUrl::parse("https://www.instagram.com/reels/XYZ/").unwrap();
        assert_eq!(reels.normalized, "https://www.instagram.com/reel/XYZ/");
    }

    #[test]
    fn test_tiktok_video_id() {
        assert_eq!(
            key("https://www.tiktok.com/@someone/video/7234567890123456789?lang=en"),
            Some("tiktok:7234567890123456789".into())
        );
    }

    #[test]
    fn test_short_links_fall_back_to_url_key() {
        let parsed = ContentUrl::parse("https://vm.tiktok.com/ZMabc123/?x=1").unwrap();
        assert!(parsed.content_id.is_none());
        assert_eq!(parsed.record_key(), "tiktok:https://vm.tiktok.com/ZMabc123/");
    }

    #[test]
    fn test_unsupported_hosts() {
        assert!(ContentUrl::parse("https://vimeo.com/123").is_none());
        assert!(ContentUrl::parse("not a url").is_none());
    }
}
