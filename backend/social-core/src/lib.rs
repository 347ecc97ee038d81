//! Lume social pipeline core.
//!
//! A single user action (follow, post-create, media-upload-complete) fans out
//! into graph mutations, derived state updates, cached feed materialization
//! and push notifications, without synchronous coupling between producers and
//! consumers. Components are constructed with explicit collaborator handles
//! (document store, cache, event bus, object storage, push transport) and
//! converge idempotently under at-least-once delivery.

pub mod auth;
pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod graph;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod storage;
pub mod store;

pub use error::{CoreError, CoreResult};
