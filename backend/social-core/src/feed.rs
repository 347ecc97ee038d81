//! Fan-out-on-read feed aggregation.
//!
//! Feeds are computed at query time by merging per-author streams and cached
//! with a short TTL. Expiry is the only invalidation: a fresh post may take
//! up to one TTL window to appear. That trade (simplicity over freshness) is
//! part of the contract; do not bolt event-driven invalidation onto it.

use crate::cache::Cache;
use crate::config::FeedConfig;
use crate::error::CoreResult;
use crate::graph::SocialGraph;
use crate::models::Post;
use crate::store::{collections, from_document, with_deadline, Document, DocumentStore};
use std::sync::Arc;
use tracing::{debug, warn};

const GLOBAL_KEY: &str = "feed:global";

fn viewer_key(uid: &str) -> String {
    format!("feed:user:{}", uid)
}

pub struct FeedAggregator {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn Cache>,
    graph: Arc<SocialGraph>,
    config: FeedConfig,
}

impl FeedAggregator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn Cache>,
        graph: Arc<SocialGraph>,
        config: FeedConfig,
    ) -> Self {
        Self {
            store,
            cache,
            graph,
            config,
        }
    }

    /// The most recent posts across all authors, newest first
    pub async fn get_global_feed(&self) -> CoreResult<Vec<Post>> {
        if let Some(posts) = self.cached(GLOBAL_KEY).await {
            return Ok(posts);
        }

        let docs = with_deadline(
            self.config.store_timeout,
            self.store
                .query_recent(collections::POSTS, "timestamp", self.config.global_limit),
        )
        .await?;
        let posts = parse_posts(docs);

        self.fill(GLOBAL_KEY, &posts, self.config.global_ttl).await;
        Ok(posts)
    }

    /// Posts from authors the viewer follows, newest first.
    ///
    /// Followed authors are partitioned into fixed-size chunks for the
    /// membership-filtered queries; chunk results are merged, stable-sorted
    /// descending by timestamp and truncated. An empty following set is a
    /// valid, cacheable answer.
    pub async fn get_following_feed(&self, viewer: &str) -> CoreResult<Vec<Post>> {
        let key = viewer_key(viewer);
        if let Some(posts) = self.cached(&key).await {
            return Ok(posts);
        }

        let following = self.graph.list_following(viewer).await?;
        if following.is_empty() {
            let empty: Vec<Post> = Vec::new();
            self.fill(&key, &empty, self.config.following_ttl).await;
            return Ok(empty);
        }

        let mut merged = Vec::new();
        for chunk in following.chunks(self.config.chunk_size.max(1)) {
            let docs = with_deadline(
                self.config.store_timeout,
                self.store.query_recent_filtered(
                    collections::POSTS,
                    "author_id",
                    chunk,
                    "timestamp",
                    self.config.chunk_limit,
                ),
            )
            .await?;
            merged.extend(parse_posts(docs));
        }

        // Stable sort keeps ties deterministic across recomputations
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        merged.truncate(self.config.merged_limit);

        self.fill(&key, &merged, self.config.following_ttl).await;
        Ok(merged)
    }

    /// Cache read; any failure degrades to a miss
    async fn cached(&self, key: &str) -> Option<Vec<Post>> {
        match self.cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(posts) => {
                    debug!(key = %key, "Feed cache hit");
                    Some(posts)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Corrupt feed cache entry, recomputing");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Feed cache read failed, recomputing");
                None
            }
        }
    }

    /// Cache write; failures are logged and swallowed
    async fn fill(&self, key: &str, posts: &[Post], ttl: std::time::Duration) {
        let json = match serde_json::to_string(posts) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Feed serialization failed, not caching");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &json, ttl).await {
            warn!(key = %key, error = %e, "Feed cache write failed");
        }
    }
}

fn parse_posts(docs: Vec<Document>) -> Vec<Post> {
    docs.into_iter()
        .filter_map(|doc| match from_document::<Post>(doc) {
            Ok(post) => Some(post),
            Err(e) => {
                warn!(error = %e, "Skipping unparseable post document");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryEventBus;
    use crate::cache::{Cache, MemoryCache};
    use crate::error::CoreError;
    use crate::store::{DocumentStore, MemoryStore, WriteOp};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Store double that counts reads, for asserting cache behavior
    struct CountingStore {
        inner: MemoryStore,
        reads: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                reads: AtomicUsize::new(0),
            }
        }

        fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn get(&self, collection: &str, key: &str) -> CoreResult<Option<Document>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(collection, key).await
        }

        async fn list_keys(&self, collection: &str) -> CoreResult<Vec<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.list_keys(collection).await
        }

        async fn query_recent(
            &self,
            collection: &str,
            order_field: &str,
            limit: usize,
        ) -> CoreResult<Vec<Document>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.query_recent(collection, order_field, limit).await
        }

        async fn query_recent_filtered(
            &self,
            collection: &str,
            filter_field: &str,
            values: &[String],
            order_field: &str,
            limit: usize,
        ) -> CoreResult<Vec<Document>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner
                .query_recent_filtered(collection, filter_field, values, order_field, limit)
                .await
        }

        async fn commit(&self, batch: Vec<WriteOp>) -> CoreResult<()> {
            self.inner.commit(batch).await
        }
    }

    /// Cache double that always fails
    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> CoreResult<Option<String>> {
            Err(CoreError::StoreUnavailable("cache down".into()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CoreResult<()> {
            Err(CoreError::StoreUnavailable("cache down".into()))
        }
    }

    fn post_doc(id: &str, author: &str, ts_micros: i64) -> Document {
        json!({
            "id": id,
            "author_id": author,
            "caption": format!("caption {}", id),
            "media_path": format!("posts/{}/{}.jpg", author, id),
            "media_type": "image",
            "like_count": 0,
            "comment_count": 0,
            "timestamp": ts_micros,
            "processed": false,
        })
        .as_object()
        .unwrap()
        .clone()
    }

    struct Fixture {
        store: Arc<CountingStore>,
        aggregator: FeedAggregator,
    }

    fn fixture(config: FeedConfig) -> Fixture {
        fixture_with_cache(config, Arc::new(MemoryCache::new()))
    }

    fn fixture_with_cache(config: FeedConfig, cache: Arc<dyn Cache>) -> Fixture {
        let store = Arc::new(CountingStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        let graph = Arc::new(SocialGraph::new(store.clone(), bus));
        let aggregator = FeedAggregator::new(store.clone(), cache, graph, config);
        Fixture { store, aggregator }
    }

    async fn seed_post(store: &CountingStore, id: &str, author: &str, ts: i64) {
        store.inner.set(collections::POSTS, id, post_doc(id, author, ts)).await.unwrap();
    }

    async fn seed_follows(store: &CountingStore, viewer: &str, authors: &[&str]) {
        for author in authors {
            store
                .inner
                .set(&collections::following(viewer), author, Document::new())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn following_feed_orders_newest_first() {
        let f = fixture(FeedConfig::default());
        let authors = ["a1", "a2", "a3", "a4", "a5"];
        seed_follows(&f.store, "viewer", &authors).await;
        for (i, author) in authors.iter().enumerate() {
            seed_post(&f.store, &format!("p{}", i + 1), author, (i as i64 + 1) * 1000).await;
        }

        let feed = f.aggregator.get_following_feed("viewer").await.unwrap();
        let ids: Vec<&str> = feed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p5", "p4", "p3", "p2", "p1"]);
    }

    #[tokio::test]
    async fn following_feed_truncates_to_the_most_recent_hundred() {
        let f = fixture(FeedConfig::default());
        // 30 authors over 3 chunks, 5 posts each: no chunk hits its own
        // limit, so the merge sees all 150 candidates
        let authors: Vec<String> = (0..30).map(|i| format!("a{:02}", i)).collect();
        let author_refs: Vec<&str> = authors.iter().map(String::as_str).collect();
        seed_follows(&f.store, "viewer", &author_refs).await;
        for i in 0..150i64 {
            let author = &authors[(i % 30) as usize];
            seed_post(&f.store, &format!("p{:03}", i), author, i * 1000).await;
        }

        let feed = f.aggregator.get_following_feed("viewer").await.unwrap();
        assert_eq!(feed.len(), 100);
        assert_eq!(feed[0].id, "p149");
        assert_eq!(feed[99].id, "p050");
    }

    #[tokio::test]
    async fn empty_following_is_cached_and_skips_the_store() {
        let f = fixture(FeedConfig::default());

        let feed = f.aggregator.get_following_feed("loner").await.unwrap();
        assert!(feed.is_empty());
        let reads_after_first = f.store.read_count();
        assert!(reads_after_first > 0);

        let feed = f.aggregator.get_following_feed("loner").await.unwrap();
        assert!(feed.is_empty());
        assert_eq!(f.store.read_count(), reads_after_first);
    }

    #[tokio::test]
    async fn cached_feed_goes_stale_until_ttl_expires() {
        let config = FeedConfig {
            following_ttl: Duration::from_millis(50),
            ..FeedConfig::default()
        };
        let f = fixture(config);
        seed_follows(&f.store, "viewer", &["a1"]).await;
        seed_post(&f.store, "p1", "a1", 1000).await;

        let feed = f.aggregator.get_following_feed("viewer").await.unwrap();
        assert_eq!(feed.len(), 1);

        // Within the TTL the cached copy hides the new post
        seed_post(&f.store, "p2", "a1", 2000).await;
        let feed = f.aggregator.get_following_feed("viewer").await.unwrap();
        assert_eq!(feed.len(), 1);

        // After expiry the feed is recomputed, not served stale
        tokio::time::sleep(Duration::from_millis(80)).await;
        let feed = f.aggregator.get_following_feed("viewer").await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].id, "p2");
    }

    #[tokio::test]
    async fn global_feed_caps_at_limit_and_caches() {
        let f = fixture(FeedConfig::default());
        for i in 0..60i64 {
            seed_post(&f.store, &format!("p{:02}", i), "author", i * 1000).await;
        }

        let feed = f.aggregator.get_global_feed().await.unwrap();
        assert_eq!(feed.len(), 50);
        assert_eq!(feed[0].id, "p59");

        let reads = f.store.read_count();
        let feed = f.aggregator.get_global_feed().await.unwrap();
        assert_eq!(feed.len(), 50);
        assert_eq!(f.store.read_count(), reads);
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_compute() {
        let f = fixture_with_cache(FeedConfig::default(), Arc::new(BrokenCache));
        seed_follows(&f.store, "viewer", &["a1"]).await;
        seed_post(&f.store, "p1", "a1", 1000).await;

        let feed = f.aggregator.get_following_feed("viewer").await.unwrap();
        assert_eq!(feed.len(), 1);

        // Every request recomputes; none fails
        let feed = f.aggregator.get_following_feed("viewer").await.unwrap();
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn chunking_covers_every_followed_author() {
        let config = FeedConfig {
            chunk_size: 2,
            ..FeedConfig::default()
        };
        let f = fixture(config);
        let authors = ["a1", "a2", "a3", "a4", "a5"];
        seed_follows(&f.store, "viewer", &authors).await;
        for (i, author) in authors.iter().enumerate() {
            seed_post(&f.store, &format!("p{}", i), author, (i as i64) * 1000).await;
        }

        let reads_before = f.store.read_count();
        let feed = f.aggregator.get_following_feed("viewer").await.unwrap();
        assert_eq!(feed.len(), 5);
        // list_following + ceil(5/2) = 3 membership queries
        assert_eq!(f.store.read_count() - reads_before, 4);
    }
}
