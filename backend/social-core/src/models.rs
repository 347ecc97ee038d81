//! Domain records persisted in the document store.
//!
//! Records are stored schemalessly (see [`crate::store::Document`]) so that
//! lifecycle transitions can merge individual fields without clobbering the
//! rest; these types are the typed views parsed at the component boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media a post carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    /// File extension assumed when the client does not name one
    pub fn default_ext(&self) -> &'static str {
        match self {
            MediaType::Image => "jpg",
            MediaType::Video => "mp4",
        }
    }
}

/// A user profile document.
///
/// Created on first profile write and mutated by merge writes only, so every
/// field must tolerate being absent. `following_count`/`followers_count` are
/// derived from the mirrored edge sets and converge eventually; they are
/// never authoritative mid-mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub following_count: i64,
    #[serde(default)]
    pub followers_count: i64,
    /// Push delivery token; absent for users who disabled notifications
    #[serde(default)]
    pub fcm_token: Option<String>,
}

/// A post document.
///
/// Two modeled lifecycle states: drafted (`processed == false`, no thumbnail)
/// and processed. The media-ready moment between them is observed only via
/// the storage completion event and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub caption: String,
    /// Storage object path of the uploaded media
    pub media_path: String,
    pub media_type: MediaType,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    /// Server-assigned; serialized as epoch microseconds so the store can
    /// order and range-scan on it
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn media_type_wire_form_is_lowercase() {
        assert_eq!(serde_json::to_value(MediaType::Video).unwrap(), "video");
        assert_eq!(MediaType::Image.default_ext(), "jpg");
        assert_eq!(MediaType::Video.default_ext(), "mp4");
    }

    #[test]
    fn post_timestamp_serializes_as_sortable_integer() {
        let post = Post {
            id: "p1".into(),
            author_id: "alice".into(),
            caption: "first".into(),
            media_path: "posts/alice/p1.jpg".into(),
            media_type: MediaType::Image,
            like_count: 0,
            comment_count: 0,
            timestamp: Utc.timestamp_micros(1_700_000_000_000_000).unwrap(),
            processed: false,
            thumbnail_url: None,
        };
        let value = serde_json::to_value(&post).unwrap();
        assert_eq!(value["timestamp"], 1_700_000_000_000_000i64);
        let back: Post = serde_json::from_value(value).unwrap();
        assert_eq!(back.timestamp, post.timestamp);
    }

    #[test]
    fn partial_user_document_parses_with_defaults() {
        let profile: UserProfile =
            serde_json::from_value(serde_json::json!({ "display_name": "Alice" })).unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert_eq!(profile.followers_count, 0);
        assert!(profile.fcm_token.is_none());
    }
}
