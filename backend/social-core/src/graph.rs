//! Social graph store: mirrored follow edges plus derived counters.
//!
//! A follow edge lives twice, once per direction, and the four writes of a
//! mutation (two edge docs, two counter transforms) go through one atomic
//! batch: readers see all of them or none. Counter/cardinality equality is
//! eventual, never transactional.

use crate::bus::EventBus;
use crate::error::{CoreError, CoreResult};
use crate::models::UserProfile;
use crate::store::{collections, from_document, with_deadline, Document, DocumentStore, WriteOp};
use event_schema::{channels, EventEnvelope, SocialEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SOURCE: &str = "graph";
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Profile fields owned by graph mutations; a profile merge may not
/// overwrite them
const DERIVED_FIELDS: [&str; 2] = ["following_count", "followers_count"];

pub struct SocialGraph {
    store: Arc<dyn DocumentStore>,
    bus: Arc<dyn EventBus>,
    store_timeout: Duration,
}

impl SocialGraph {
    pub fn new(store: Arc<dyn DocumentStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Create the mirrored follow edge and bump both counters.
    ///
    /// Re-following an existing edge is an idempotent no-op: no counter
    /// drift, no duplicate event. Emits `UserFollowed` after the commit;
    /// there is no compensating transaction between the two, so a failure
    /// in between leaves the edge written and the notification unsent.
    pub async fn follow(&self, follower: &str, target: &str) -> CoreResult<()> {
        if follower == target {
            return Err(CoreError::InvalidRequest(
                "cannot follow yourself".to_string(),
            ));
        }

        let following = collections::following(follower);
        let existing =
            with_deadline(self.store_timeout, self.store.get(&following, target)).await?;
        if existing.is_some() {
            debug!(follower = %follower, target = %target, "Edge already present, skipping");
            return Ok(());
        }

        let batch = vec![
            WriteOp::set(&following, target, Document::new()),
            WriteOp::set(&collections::followers(target), follower, Document::new()),
            WriteOp::increment(collections::USERS, follower, "following_count", 1),
            WriteOp::increment(collections::USERS, target, "followers_count", 1),
        ];
        with_deadline(self.store_timeout, self.store.commit(batch)).await?;

        let envelope = EventEnvelope::new(
            SOURCE,
            SocialEvent::UserFollowed {
                follower_id: follower.to_string(),
                target_id: target.to_string(),
            },
        );
        if let Err(e) = self.bus.publish(channels::SOCIAL, envelope).await {
            // Edge is committed; the follower notification will simply
            // never fire
            warn!(
                follower = %follower,
                target = %target,
                error = %e,
                "Follow committed but event publish failed"
            );
        }
        Ok(())
    }

    /// Remove the mirrored edge and decrement both counters.
    ///
    /// The edge is checked first: removing an absent edge returns `NotFound`
    /// and touches no counter. Decrements clamp at zero in the store.
    pub async fn unfollow(&self, follower: &str, target: &str) -> CoreResult<()> {
        let following = collections::following(follower);
        let existing =
            with_deadline(self.store_timeout, self.store.get(&following, target)).await?;
        if existing.is_none() {
            return Err(CoreError::NotFound(format!(
                "{} does not follow {}",
                follower, target
            )));
        }

        let batch = vec![
            WriteOp::delete(&following, target),
            WriteOp::delete(&collections::followers(target), follower),
            WriteOp::increment(collections::USERS, follower, "following_count", -1),
            WriteOp::increment(collections::USERS, target, "followers_count", -1),
        ];
        with_deadline(self.store_timeout, self.store.commit(batch)).await
    }

    /// Unordered set of targets `uid` follows
    pub async fn list_following(&self, uid: &str) -> CoreResult<Vec<String>> {
        with_deadline(
            self.store_timeout,
            self.store.list_keys(&collections::following(uid)),
        )
        .await
    }

    pub async fn get_user(&self, uid: &str) -> CoreResult<UserProfile> {
        let doc = with_deadline(self.store_timeout, self.store.get(collections::USERS, uid))
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {} not found", uid)))?;
        from_document(doc)
    }

    /// Merge-write profile attributes. Self-only: `actor` must be the
    /// profile owner. Derived counter fields are stripped from the merge;
    /// they belong to graph mutations.
    pub async fn update_profile(
        &self,
        actor: &str,
        uid: &str,
        mut fields: Document,
    ) -> CoreResult<()> {
        if actor != uid {
            return Err(CoreError::Forbidden(format!(
                "{} may not update profile of {}",
                actor, uid
            )));
        }
        for field in DERIVED_FIELDS {
            fields.remove(field);
        }
        with_deadline(
            self.store_timeout,
            self.store.merge(collections::USERS, uid, fields),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Bus double that records published envelopes
    #[derive(Default)]
    struct RecordingBus {
        published: Mutex<Vec<(String, EventEnvelope)>>,
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn publish(&self, channel: &str, envelope: EventEnvelope) -> CoreResult<()> {
            self.published
                .lock()
                .unwrap()
                .push((channel.to_string(), envelope));
            Ok(())
        }
    }

    fn graph() -> (SocialGraph, Arc<MemoryStore>, Arc<RecordingBus>) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(RecordingBus::default());
        (
            SocialGraph::new(store.clone(), bus.clone()),
            store,
            bus,
        )
    }

    async fn counts(store: &MemoryStore, uid: &str) -> (i64, i64) {
        let doc = store.get(collections::USERS, uid).await.unwrap();
        let doc = doc.unwrap_or_default();
        (
            doc.get("following_count").and_then(|v| v.as_i64()).unwrap_or(0),
            doc.get("followers_count").and_then(|v| v.as_i64()).unwrap_or(0),
        )
    }

    #[tokio::test]
    async fn follow_then_unfollow_restores_both_sides() {
        let (graph, store, _) = graph();

        graph.follow("alice", "bob").await.unwrap();
        assert_eq!(graph.list_following("alice").await.unwrap(), ["bob"]);
        assert_eq!(
            store.list_keys(&collections::followers("bob")).await.unwrap(),
            ["alice"]
        );
        assert_eq!(counts(&store, "alice").await, (1, 0));
        assert_eq!(counts(&store, "bob").await, (0, 1));

        graph.unfollow("alice", "bob").await.unwrap();
        assert!(graph.list_following("alice").await.unwrap().is_empty());
        assert!(store
            .list_keys(&collections::followers("bob"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(counts(&store, "alice").await, (0, 0));
        assert_eq!(counts(&store, "bob").await, (0, 0));
    }

    #[tokio::test]
    async fn self_follow_is_rejected_with_no_state_change() {
        let (graph, store, bus) = graph();

        let result = graph.follow("alice", "alice").await;
        assert!(matches!(result, Err(CoreError::InvalidRequest(_))));
        assert!(store
            .list_keys(&collections::following("alice"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(counts(&store, "alice").await, (0, 0));
        assert!(bus.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_follow_neither_drifts_counters_nor_republishes() {
        let (graph, store, bus) = graph();

        graph.follow("alice", "bob").await.unwrap();
        graph.follow("alice", "bob").await.unwrap();

        assert_eq!(counts(&store, "alice").await, (1, 0));
        assert_eq!(counts(&store, "bob").await, (0, 1));
        assert_eq!(bus.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn follow_publishes_user_followed_on_social_channel() {
        let (graph, _, bus) = graph();

        graph.follow("alice", "bob").await.unwrap();

        let published = bus.published.lock().unwrap();
        let (channel, envelope) = &published[0];
        assert_eq!(channel, channels::SOCIAL);
        assert_eq!(
            envelope.event,
            SocialEvent::UserFollowed {
                follower_id: "alice".into(),
                target_id: "bob".into(),
            }
        );
    }

    #[tokio::test]
    async fn unfollow_of_absent_edge_is_not_found_and_touches_nothing() {
        let (graph, store, _) = graph();
        graph.follow("alice", "bob").await.unwrap();

        let result = graph.unfollow("carol", "bob").await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
        assert_eq!(counts(&store, "bob").await, (0, 1));
        assert_eq!(counts(&store, "carol").await, (0, 0));
    }

    #[tokio::test]
    async fn profile_updates_are_self_only_and_spare_counters() {
        let (graph, store, _) = graph();
        graph.follow("bob", "alice").await.unwrap();

        let result = graph
            .update_profile(
                "mallory",
                "alice",
                json!({"display_name": "Not Alice"}).as_object().unwrap().clone(),
            )
            .await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));

        graph
            .update_profile(
                "alice",
                "alice",
                json!({"display_name": "Alice", "followers_count": 9000})
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .await
            .unwrap();

        let profile = graph.get_user("alice").await.unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert_eq!(profile.followers_count, 1);
        assert_eq!(counts(&store, "alice").await, (0, 1));
    }

    #[tokio::test]
    async fn unknown_user_lookup_is_not_found() {
        let (graph, _, _) = graph();
        assert!(matches!(
            graph.get_user("ghost").await,
            Err(CoreError::NotFound(_))
        ));
    }
}
