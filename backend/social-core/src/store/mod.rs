//! Document store collaborator contract.
//!
//! The pipeline depends on key/document semantics only: get, set/merge,
//! ordered range queries with a limit, membership-filtered queries over a
//! bounded value set, and an atomic multi-write batch (used by graph
//! mutation). Adapters: [`memory::MemoryStore`] for tests and
//! [`postgres::PostgresStore`] for deployments.

pub mod memory;
pub mod postgres;

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// A schemaless record: field name to JSON value
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Collection names and edge-collection path helpers.
///
/// Follow edges are mirrored across two per-user collections so either
/// direction resolves with a single key listing.
pub mod collections {
    pub const USERS: &str = "users";
    pub const POSTS: &str = "posts";

    /// Targets `uid` follows
    pub fn following(uid: &str) -> String {
        format!("users/{}/following", uid)
    }

    /// Users following `uid`
    pub fn followers(uid: &str) -> String {
        format!("users/{}/followers", uid)
    }
}

/// One write inside an atomic batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Replace the whole document (upsert)
    Set {
        collection: String,
        key: String,
        doc: Document,
    },
    /// Merge fields into the document, creating it if absent; untouched
    /// fields are preserved
    Merge {
        collection: String,
        key: String,
        doc: Document,
    },
    /// Remove the document; removing an absent document is a no-op
    Delete { collection: String, key: String },
    /// Add `delta` to a numeric field, creating document/field as needed.
    /// The result is clamped at zero: counters never go negative.
    Increment {
        collection: String,
        key: String,
        field: String,
        delta: i64,
    },
}

impl WriteOp {
    pub fn set(collection: &str, key: &str, doc: Document) -> Self {
        WriteOp::Set {
            collection: collection.to_string(),
            key: key.to_string(),
            doc,
        }
    }

    pub fn merge(collection: &str, key: &str, doc: Document) -> Self {
        WriteOp::Merge {
            collection: collection.to_string(),
            key: key.to_string(),
            doc,
        }
    }

    pub fn delete(collection: &str, key: &str) -> Self {
        WriteOp::Delete {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    pub fn increment(collection: &str, key: &str, field: &str, delta: i64) -> Self {
        WriteOp::Increment {
            collection: collection.to_string(),
            key: key.to_string(),
            field: field.to_string(),
            delta,
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document; absence is a value, not an error
    async fn get(&self, collection: &str, key: &str) -> CoreResult<Option<Document>>;

    /// All keys of a collection, unordered
    async fn list_keys(&self, collection: &str) -> CoreResult<Vec<String>>;

    /// The `limit` documents with the greatest integer `order_field`,
    /// descending
    async fn query_recent(
        &self,
        collection: &str,
        order_field: &str,
        limit: usize,
    ) -> CoreResult<Vec<Document>>;

    /// Like [`DocumentStore::query_recent`], restricted to documents whose
    /// string `filter_field` is one of `values`. Callers bound the size of
    /// `values`; adapters may reject oversized sets.
    async fn query_recent_filtered(
        &self,
        collection: &str,
        filter_field: &str,
        values: &[String],
        order_field: &str,
        limit: usize,
    ) -> CoreResult<Vec<Document>>;

    /// Apply a batch all-or-nothing: concurrent readers observe either none
    /// or all of its writes
    async fn commit(&self, batch: Vec<WriteOp>) -> CoreResult<()>;

    /// Upsert a full document
    async fn set(&self, collection: &str, key: &str, doc: Document) -> CoreResult<()> {
        self.commit(vec![WriteOp::set(collection, key, doc)]).await
    }

    /// Merge fields into a document without touching the rest
    async fn merge(&self, collection: &str, key: &str, doc: Document) -> CoreResult<()> {
        self.commit(vec![WriteOp::merge(collection, key, doc)])
            .await
    }
}

/// Serialize a record into its document form
pub fn to_document<T: Serialize>(value: &T) -> CoreResult<Document> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(CoreError::Internal(format!(
            "expected an object document, got {}",
            other
        ))),
    }
}

/// Parse a document into a typed record
pub fn from_document<T: DeserializeOwned>(doc: Document) -> CoreResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(doc))?)
}

/// Bound a store round-trip by the caller's deadline; overrun surfaces as
/// [`CoreError::Cancelled`] instead of hanging
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    tokio::time::timeout(limit, fut).await?
}
