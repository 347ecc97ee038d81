//! In-memory document store.
//!
//! Backs the test suite and local development. A single process-wide RwLock
//! makes `commit` all-or-nothing with respect to concurrent readers, which
//! is exactly the batch atomicity the graph mutation path requires.

use super::{Document, DocumentStore, WriteOp};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_guard(
        &self,
    ) -> CoreResult<std::sync::RwLockReadGuard<'_, HashMap<String, BTreeMap<String, Document>>>>
    {
        self.data
            .read()
            .map_err(|_| CoreError::Internal("store lock poisoned".to_string()))
    }

    fn apply(data: &mut HashMap<String, BTreeMap<String, Document>>, op: &WriteOp) {
        match op {
            WriteOp::Set {
                collection,
                key,
                doc,
            } => {
                data.entry(collection.clone())
                    .or_default()
                    .insert(key.clone(), doc.clone());
            }
            WriteOp::Merge {
                collection,
                key,
                doc,
            } => {
                let entry = data
                    .entry(collection.clone())
                    .or_default()
                    .entry(key.clone())
                    .or_default();
                for (field, value) in doc {
                    entry.insert(field.clone(), value.clone());
                }
            }
            WriteOp::Delete { collection, key } => {
                if let Some(docs) = data.get_mut(collection) {
                    docs.remove(key);
                }
            }
            WriteOp::Increment {
                collection,
                key,
                field,
                delta,
            } => {
                let entry = data
                    .entry(collection.clone())
                    .or_default()
                    .entry(key.clone())
                    .or_default();
                let current = entry.get(field).and_then(|v| v.as_i64()).unwrap_or(0);
                let next = (current + delta).max(0);
                entry.insert(field.clone(), serde_json::Value::from(next));
            }
        }
    }
}

fn order_value(doc: &Document, order_field: &str) -> i64 {
    doc.get(order_field)
        .and_then(|v| v.as_i64())
        .unwrap_or(i64::MIN)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> CoreResult<Option<Document>> {
        let data = self.read_guard()?;
        Ok(data.get(collection).and_then(|docs| docs.get(key)).cloned())
    }

    async fn list_keys(&self, collection: &str) -> CoreResult<Vec<String>> {
        let data = self.read_guard()?;
        Ok(data
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn query_recent(
        &self,
        collection: &str,
        order_field: &str,
        limit: usize,
    ) -> CoreResult<Vec<Document>> {
        let data = self.read_guard()?;
        let mut docs: Vec<Document> = data
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        docs.sort_by_key(|doc| std::cmp::Reverse(order_value(doc, order_field)));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn query_recent_filtered(
        &self,
        collection: &str,
        filter_field: &str,
        values: &[String],
        order_field: &str,
        limit: usize,
    ) -> CoreResult<Vec<Document>> {
        let data = self.read_guard()?;
        let mut docs: Vec<Document> = data
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| {
                        doc.get(filter_field)
                            .and_then(|v| v.as_str())
                            .map(|v| values.iter().any(|wanted| wanted == v))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by_key(|doc| std::cmp::Reverse(order_value(doc, order_field)));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn commit(&self, batch: Vec<WriteOp>) -> CoreResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| CoreError::Internal("store lock poisoned".to_string()))?;
        for op in &batch {
            Self::apply(&mut data, op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(fields: serde_json::Value) -> Document {
        fields.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn merge_preserves_untouched_fields() {
        let store = MemoryStore::new();
        store
            .set(
                "posts",
                "p1",
                doc(json!({"caption": "hi", "like_count": 3})),
            )
            .await
            .unwrap();
        store
            .merge("posts", "p1", doc(json!({"processed": true})))
            .await
            .unwrap();

        let got = store.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(got["caption"], "hi");
        assert_eq!(got["like_count"], 3);
        assert_eq!(got["processed"], true);
    }

    #[tokio::test]
    async fn increments_clamp_at_zero() {
        let store = MemoryStore::new();
        store
            .commit(vec![WriteOp::increment("users", "alice", "followers_count", -5)])
            .await
            .unwrap();
        let got = store.get("users", "alice").await.unwrap().unwrap();
        assert_eq!(got["followers_count"], 0);

        store
            .commit(vec![WriteOp::increment("users", "alice", "followers_count", 2)])
            .await
            .unwrap();
        let got = store.get("users", "alice").await.unwrap().unwrap();
        assert_eq!(got["followers_count"], 2);
    }

    #[tokio::test]
    async fn batch_applies_every_write() {
        let store = MemoryStore::new();
        store
            .commit(vec![
                WriteOp::set("users/a/following", "b", Document::new()),
                WriteOp::set("users/b/followers", "a", Document::new()),
                WriteOp::increment("users", "a", "following_count", 1),
                WriteOp::increment("users", "b", "followers_count", 1),
            ])
            .await
            .unwrap();

        assert_eq!(store.list_keys("users/a/following").await.unwrap(), ["b"]);
        assert_eq!(store.list_keys("users/b/followers").await.unwrap(), ["a"]);
        let a = store.get("users", "a").await.unwrap().unwrap();
        assert_eq!(a["following_count"], 1);
    }

    #[tokio::test]
    async fn recent_queries_order_and_filter() {
        let store = MemoryStore::new();
        for (key, author, ts) in [
            ("p1", "alice", 100),
            ("p2", "bob", 300),
            ("p3", "carol", 200),
        ] {
            store
                .set(
                    "posts",
                    key,
                    doc(json!({"id": key, "author_id": author, "timestamp": ts})),
                )
                .await
                .unwrap();
        }

        let recent = store.query_recent("posts", "timestamp", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0]["id"], "p2");
        assert_eq!(recent[1]["id"], "p3");

        let filtered = store
            .query_recent_filtered(
                "posts",
                "author_id",
                &["alice".to_string(), "carol".to_string()],
                "timestamp",
                50,
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0]["id"], "p3");
        assert_eq!(filtered[1]["id"], "p1");
    }
}
