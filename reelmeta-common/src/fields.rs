//! Canonical field vocabulary
//!
//! One closed set of field names shared by every extraction strategy, the
//! merge engine and both sinks. Renaming a field is a compile-time change.

use crate::{Error, Platform, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical metadata field name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    Title,
    Description,
    ChannelName,
    ChannelId,
    ChannelUrl,
    UploadDate,
    /// Duration in seconds
    Duration,
    Views,
    Likes,
    CommentsCount,
    Subscribers,
    ThumbnailUrl,
    Keywords,
    Category,
    Language,
}

impl FieldName {
    /// Every field, in canonical (column) order
    pub const ALL: [FieldName; 15] = [
        FieldName::Title,
        FieldName::Description,
        FieldName::ChannelName,
        FieldName::ChannelId,
        FieldName::ChannelUrl,
        FieldName::UploadDate,
        FieldName::Duration,
        FieldName::Views,
        FieldName::Likes,
        FieldName::CommentsCount,
        FieldName::Subscribers,
        FieldName::ThumbnailUrl,
        FieldName::Keywords,
        FieldName::Category,
        FieldName::Language,
    ];

    /// Wire name (camelCase, matches serde)
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Description => "description",
            FieldName::ChannelName => "channelName",
            FieldName::ChannelId => "channelId",
            FieldName::ChannelUrl => "channelUrl",
            FieldName::UploadDate => "uploadDate",
            FieldName::Duration => "duration",
            FieldName::Views => "views",
            FieldName::Likes => "likes",
            FieldName::CommentsCount => "commentsCount",
            FieldName::Subscribers => "subscribers",
            FieldName::ThumbnailUrl => "thumbnailUrl",
            FieldName::Keywords => "keywords",
            FieldName::Category => "category",
            FieldName::Language => "language",
        }
    }

    /// snake_case column name for tabular storage
    pub fn column_name(&self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Description => "description",
            FieldName::ChannelName => "channel_name",
            FieldName::ChannelId => "channel_id",
            FieldName::ChannelUrl => "channel_url",
            FieldName::UploadDate => "upload_date",
            FieldName::Duration => "duration",
            FieldName::Views => "views",
            FieldName::Likes => "likes",
            FieldName::CommentsCount => "comments_count",
            FieldName::Subscribers => "subscribers",
            FieldName::ThumbnailUrl => "thumbnail_url",
            FieldName::Keywords => "keywords",
            FieldName::Category => "category",
            FieldName::Language => "language",
        }
    }

    /// Whether the platform exposes this field at all
    ///
    /// Drives the per-platform tabular column layout.
    pub fn applies_to(&self, platform: Platform) -> bool {
        match platform {
            Platform::YouTube => true,
            Platform::Instagram => !matches!(
                self,
                FieldName::ChannelId
                    | FieldName::Duration
                    | FieldName::Subscribers
                    | FieldName::Category
                    | FieldName::Language
            ),
            Platform::TikTok => !matches!(
                self,
                FieldName::ChannelId | FieldName::Subscribers | FieldName::Category | FieldName::Language
            ),
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldName::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s || f.column_name() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown field: {}", s)))
    }
}

/// Field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Count(u64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Text value, treating blank strings as absent
    pub fn text(value: impl Into<String>) -> Option<FieldValue> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(FieldValue::Text(trimmed.to_string()))
        }
    }

    /// List value, treating an empty list as absent
    pub fn list<I, S>(values: I) -> Option<FieldValue>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.trim().is_empty())
            .collect();
        if items.is_empty() {
            None
        } else {
            Some(FieldValue::List(items))
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            FieldValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// Flat rendering for a single spreadsheet-style cell
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Count(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for field in FieldName::ALL {
            assert_eq!(field.as_str().parse::<FieldName>().unwrap(), field);
            assert_eq!(field.column_name().parse::<FieldName>().unwrap(), field);
        }
    }

    #[test]
    fn test_youtube_uses_every_field() {
        assert!(FieldName::ALL.iter().all(|f| f.applies_to(Platform::YouTube)));
    }

    #[test]
    fn test_instagram_excludes_subscribers() {
        assert!(!FieldName::Subscribers.applies_to(Platform::Instagram));
        assert!(FieldName::Likes.applies_to(Platform::Instagram));
    }

    #[test]
    fn test_blank_text_is_absent() {
        assert_eq!(FieldValue::text("   "), None);
        assert_eq!(FieldValue::text(" hi "), Some(FieldValue::Text("hi".to_string())));
        assert_eq!(FieldValue::list(Vec::<String>::new()), None);
    }

    #[test]
    fn test_untagged_json_shape() {
        let json = serde_json::to_string(&FieldValue::Count(42)).unwrap();
        assert_eq!(json, "42");
        let value: FieldValue = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(value.to_cell(), "a, b");
    }
}
