//! Content platforms and URL classification

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Platform hosting a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    YouTube,
    Instagram,
    TikTok,
}

impl Platform {
    /// Every supported platform, in a stable order
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::Instagram, Platform::TikTok];

    /// Upper-case wire name (matches the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "YOUTUBE",
            Platform::Instagram => "INSTAGRAM",
            Platform::TikTok => "TIKTOK",
        }
    }

    /// Lower-case slug, safe for use in table names and content keys
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
        }
    }

    /// Classify a content URL by host
    ///
    /// Returns `None` for unparseable URLs and unknown hosts.
    pub fn detect(raw_url: &str) -> Option<Platform> {
        let parsed = Url::parse(raw_url.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        let host = host.strip_prefix("m.").unwrap_or(host);

        match host {
            "youtube.com" | "youtu.be" | "music.youtube.com" | "youtube-nocookie.com" => {
                Some(Platform::YouTube)
            }
            "instagram.com" | "instagr.am" => Some(Platform::Instagram),
            "tiktok.com" | "vm.tiktok.com" | "vt.tiktok.com" => Some(Platform::TikTok),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::YouTube),
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::TikTok),
            other => Err(Error::InvalidInput(format!("unknown platform: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_known_hosts() {
        assert_eq!(
            Platform::detect("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some(Platform::YouTube)
        );
        assert_eq!(Platform::detect("https://youtu.be/dQw4w9WgXcQ"), Some(Platform::YouTube));
        assert_eq!(
            Platform::detect("https://m.youtube.com/shorts/abc123"),
            Some(Platform::YouTube)
        );
        assert_eq!(
            Platform::detect("https://www.instagram.com/reel/C1a2b3/"),
            Some(Platform::Instagram)
        );
        assert_eq!(
            Platform::detect("https://www.tiktok.com/@user/video/7234567890"),
            Some(Platform::TikTok)
        );
    }

    #[test]
    fn test_detect_rejects_unknown() {
        assert_eq!(Platform::detect("https://vimeo.com/12345"), None);
        assert_eq!(Platform::detect("not a url"), None);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("YOUTUBE".parse::<Platform>().unwrap(), Platform::YouTube);
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::TikTok);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_serde_uses_upper_case() {
        let json = serde_json::to_string(&Platform::Instagram).unwrap();
        assert_eq!(json, "\"INSTAGRAM\"");
        let back: Platform = serde_json::from_str("\"TIKTOK\"").unwrap();
        assert_eq!(back, Platform::TikTok);
    }
}
