use chrono::{DateTime, Utc};
/// Event schema registry for the Lume social pipeline.
///
/// Every message that crosses a bus channel is an `EventEnvelope` wrapping
/// one variant of the closed `SocialEvent` enum. Payloads are strongly typed
/// end to end; serialization happens only at the bus boundary.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for all events
pub const SCHEMA_VERSION: u32 = 1;

/// Channel names. Per-channel delivery is ordered and at-least-once;
/// duplicates are possible and consumers must tolerate them.
pub mod channels {
    /// Graph and engagement events (follows, likes, comments, messages)
    pub const SOCIAL: &str = "social-events";
    /// Post lifecycle events
    pub const POSTS: &str = "post-events";
    /// Storage-level media completion signals
    pub const MEDIA: &str = "media-events";
}

/// Base envelope for all bus messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID for idempotency and tracing
    pub event_id: Uuid,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Schema version for compatibility checking
    pub schema_version: u32,
    /// Source component that generated the event
    pub source: String,
    /// Actual event payload
    pub event: SocialEvent,
}

impl EventEnvelope {
    pub fn new(source: impl Into<String>, event: SocialEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
            source: source.into(),
            event,
        }
    }
}

/// Closed set of events carried by the pipeline.
///
/// The wire tag is the SCREAMING_SNAKE_CASE kind (`USER_FOLLOWED`, ...),
/// also exposed via [`SocialEvent::kind`] for consumer routing headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SocialEvent {
    /// A follow edge was committed to the graph
    UserFollowed {
        follower_id: String,
        target_id: String,
    },
    /// A post record was created; media bytes may not exist yet
    PostDrafted {
        post_id: String,
        author_id: String,
        /// Storage object path the client was directed to upload to
        object: String,
    },
    /// Engagement: a post was liked
    PostLiked { post_id: String, liked_by: String },
    /// Engagement: a post was commented on
    PostCommented {
        post_id: String,
        commented_by: String,
    },
    /// A direct message was delivered
    MessageSent {
        recipient_id: String,
        sender_id: String,
        text: String,
    },
    /// Storage-level completion signal: the uploaded object for a post has
    /// finished processing and is available under `object`
    MediaProcessed { bucket: String, object: String },
}

impl SocialEvent {
    /// Kind tag, identical to the serialized `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            SocialEvent::UserFollowed { .. } => "USER_FOLLOWED",
            SocialEvent::PostDrafted { .. } => "POST_DRAFTED",
            SocialEvent::PostLiked { .. } => "POST_LIKED",
            SocialEvent::PostCommented { .. } => "POST_COMMENTED",
            SocialEvent::MessageSent { .. } => "MESSAGE_SENT",
            SocialEvent::MediaProcessed { .. } => "MEDIA_PROCESSED",
        }
    }

    /// Partitioning key for ordered transports: events about the same
    /// entity land on the same partition and stay ordered
    pub fn partition_key(&self) -> &str {
        match self {
            SocialEvent::UserFollowed { target_id, .. } => target_id,
            SocialEvent::PostDrafted { post_id, .. } => post_id,
            SocialEvent::PostLiked { post_id, .. } => post_id,
            SocialEvent::PostCommented { post_id, .. } => post_id,
            SocialEvent::MessageSent { recipient_id, .. } => recipient_id,
            SocialEvent::MediaProcessed { object, .. } => object,
        }
    }
}

pub fn is_compatible(current_version: u32, message_version: u32) -> bool {
    // Exact match for now; relax once a second version actually ships
    current_version == message_version
}
