//! Post lifecycle: drafted → processed.
//!
//! Create writes the drafted record and announces it; the processed
//! transition happens only when the storage-level completion signal arrives.
//! The in-between "media-ready" moment is never stored, and a draft whose
//! completion signal never arrives stays drafted; there is deliberately no
//! reconciliation pass for it.
//!
//! Both transitions are duplicate-safe: create mints a fresh key per call,
//! and the processed transition is a field merge that repeats to the same
//! state.

use crate::bus::{EventBus, EventHandler};
use crate::config::MediaConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{MediaType, Post};
use crate::storage::ObjectStorage;
use crate::store::{collections, from_document, to_document, DocumentStore};
use async_trait::async_trait;
use chrono::Utc;
use event_schema::{channels, EventEnvelope, SocialEvent};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

const SOURCE: &str = "lifecycle";

/// Client request to start a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub caption: String,
    pub media_type: MediaType,
    /// Optional; defaulted from the media type when absent
    pub file_ext: Option<String>,
}

/// Create response: the post key plus the direct-upload location
#[derive(Debug, Clone)]
pub struct CreatedPost {
    pub post_id: String,
    pub upload_url: String,
}

pub struct PostLifecycle {
    store: Arc<dyn DocumentStore>,
    bus: Arc<dyn EventBus>,
    storage: Arc<dyn ObjectStorage>,
    config: MediaConfig,
}

impl PostLifecycle {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        bus: Arc<dyn EventBus>,
        storage: Arc<dyn ObjectStorage>,
        config: MediaConfig,
    ) -> Self {
        Self {
            store,
            bus,
            storage,
            config,
        }
    }

    /// Create a drafted post and hand back the upload location.
    ///
    /// The media bytes do not exist yet; the record starts with zeroed
    /// counters and `processed == false`. `PostDrafted` is published before
    /// returning; if that publish fails the draft stays valid but its async
    /// pipeline will never run, so the failure is logged loudly.
    pub async fn create_post(&self, author: &str, request: NewPost) -> CoreResult<CreatedPost> {
        let ext = request
            .file_ext
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| request.media_type.default_ext().to_string());
        let post_id = Uuid::new_v4().to_string();
        let object = format!("posts/{}/{}.{}", author, post_id, ext);

        let upload_url = self
            .storage
            .signed_upload_url(&object, self.config.upload_url_ttl)
            .await?;

        let post = Post {
            id: post_id.clone(),
            author_id: author.to_string(),
            caption: request.caption,
            media_path: object.clone(),
            media_type: request.media_type,
            like_count: 0,
            comment_count: 0,
            timestamp: Utc::now(),
            processed: false,
            thumbnail_url: None,
        };
        self.store
            .set(collections::POSTS, &post_id, to_document(&post)?)
            .await?;

        let envelope = EventEnvelope::new(
            SOURCE,
            SocialEvent::PostDrafted {
                post_id: post_id.clone(),
                author_id: author.to_string(),
                object,
            },
        );
        if let Err(e) = self.bus.publish(channels::POSTS, envelope).await {
            error!(
                post_id = %post_id,
                author = %author,
                error = %e,
                "Post drafted but POST_DRAFTED publish failed; downstream steps will not run"
            );
        }

        info!(post_id = %post_id, author = %author, "Post drafted");
        Ok(CreatedPost {
            post_id,
            upload_url,
        })
    }

    /// Fetch one post; required for a response, so absence is a hard failure
    pub async fn get_post(&self, post_id: &str) -> CoreResult<Post> {
        let doc = self
            .store
            .get(collections::POSTS, post_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("post {} not found", post_id)))?;
        from_document(doc)
    }

    /// Apply the processed transition for a completed storage object.
    ///
    /// Unrecognized suffixes and too-shallow paths are expected noise and
    /// are skipped, never errors. The write is a field merge of
    /// `{thumbnail_url, processed}` only, so caption/counters written by
    /// anyone else survive, and redelivery converges to the same state.
    pub async fn complete_processing(&self, object: &str) -> CoreResult<()> {
        if !self.recognized_media(object) {
            debug!(object = %object, "Ignoring non-media object");
            return Ok(());
        }
        let Some(post_id) = post_key_from_path(object) else {
            debug!(object = %object, "Object path too shallow to name a post, skipping");
            return Ok(());
        };
        let Some(thumb_object) = thumbnail_object(object) else {
            debug!(object = %object, "No thumbnail derivable, skipping");
            return Ok(());
        };

        let thumbnail_url = self.storage.public_url(&thumb_object);
        self.store
            .merge(
                collections::POSTS,
                &post_id,
                to_document(&json!({
                    "thumbnail_url": thumbnail_url,
                    "processed": true,
                }))?,
            )
            .await?;

        info!(post_id = %post_id, object = %object, "Post marked processed");
        Ok(())
    }

    fn recognized_media(&self, object: &str) -> bool {
        match extension(object) {
            Some(ext) => {
                let ext = ext.to_ascii_lowercase();
                self.config.media_suffixes.iter().any(|s| *s == ext)
            }
            None => false,
        }
    }
}

#[async_trait]
impl EventHandler for PostLifecycle {
    async fn handle(&self, envelope: &EventEnvelope) -> CoreResult<()> {
        match &envelope.event {
            SocialEvent::MediaProcessed { object, .. } => self.complete_processing(object).await,
            _ => Ok(()),
        }
    }
}

fn extension(object: &str) -> Option<&str> {
    let filename = object.rsplit('/').next()?;
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// `author/post/file` convention: the post key is the file stem of a path
/// with at least three segments
fn post_key_from_path(object: &str) -> Option<String> {
    let segments: Vec<&str> = object.split('/').collect();
    if segments.len() < 3 {
        return None;
    }
    let filename = *segments.last()?;
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Source stem plus `_thumb.jpg`, alongside the source object
fn thumbnail_object(object: &str) -> Option<String> {
    let (stem, _) = object.rsplit_once('.')?;
    Some(format!("{}_thumb.jpg", stem))
}
