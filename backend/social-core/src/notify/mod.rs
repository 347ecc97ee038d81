//! Notification dispatch.
//!
//! Consumes graph and engagement events, resolves the recipient and their
//! delivery token, and fires a push. Missing recipients and missing tokens
//! are steady-state conditions (users disable notifications), so they are
//! silent no-ops; transport failures are logged and dropped. Nothing here
//! ever surfaces to a user-facing caller.

pub mod fcm;

use crate::bus::EventHandler;
use crate::error::CoreResult;
use crate::store::{collections, DocumentStore};
use async_trait::async_trait;
use event_schema::{EventEnvelope, SocialEvent};
use std::sync::Arc;
use tracing::{debug, warn};

pub use fcm::FcmClient;

/// App-branded title used when the body already names the actor
const APP_TITLE: &str = "Lume";

/// Push transport contract; delivery guarantees are the transport's problem
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, title: &str, body: &str) -> CoreResult<()>;
}

pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
    push: Arc<dyn PushSender>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, push: Arc<dyn PushSender>) -> Self {
        Self { store, push }
    }

    async fn dispatch(&self, event: &SocialEvent) -> CoreResult<()> {
        match event {
            SocialEvent::UserFollowed { target_id, .. } => {
                self.send_to_user(target_id, "New follower", "Someone started following you")
                    .await
            }
            SocialEvent::PostLiked { post_id, liked_by } => {
                self.send_to_post_author(post_id, &format!("{} liked your post", liked_by))
                    .await
            }
            SocialEvent::PostCommented {
                post_id,
                commented_by,
            } => {
                self.send_to_post_author(
                    post_id,
                    &format!("{} commented on your post", commented_by),
                )
                .await
            }
            SocialEvent::MessageSent {
                recipient_id, text, ..
            } => self.send_to_user(recipient_id, "New message", text).await,
            // Lifecycle signals are not notification triggers
            SocialEvent::PostDrafted { .. } | SocialEvent::MediaProcessed { .. } => Ok(()),
        }
    }

    async fn send_to_post_author(&self, post_id: &str, body: &str) -> CoreResult<()> {
        let Some(doc) = self.store.get(collections::POSTS, post_id).await? else {
            debug!(post_id = %post_id, "Referenced post absent, dropping notification");
            return Ok(());
        };
        let Some(author) = doc.get("author_id").and_then(|v| v.as_str()) else {
            debug!(post_id = %post_id, "Post has no author, dropping notification");
            return Ok(());
        };
        self.send_to_user(author, APP_TITLE, body).await
    }

    async fn send_to_user(&self, uid: &str, title: &str, body: &str) -> CoreResult<()> {
        if uid.is_empty() {
            return Ok(());
        }
        let Some(doc) = self.store.get(collections::USERS, uid).await? else {
            debug!(uid = %uid, "Recipient absent, dropping notification");
            return Ok(());
        };
        let token = doc
            .get("fcm_token")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty());
        let Some(token) = token else {
            debug!(uid = %uid, "Recipient has no delivery token, dropping notification");
            return Ok(());
        };

        if let Err(e) = self.push.send(token, title, body).await {
            // Fire-and-forget: no retry queue
            warn!(uid = %uid, error = %e, "Push dispatch failed, dropping");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for NotificationDispatcher {
    async fn handle(&self, envelope: &EventEnvelope) -> CoreResult<()> {
        self.dispatch(&envelope.event).await
    }
}
