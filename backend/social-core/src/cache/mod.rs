//! Best-effort cache collaborator contract.
//!
//! Absence is a valid response and unavailability is never a hard
//! dependency: callers treat any error here as a cache miss plus a warning,
//! never a failed operation.

pub mod memory;
pub mod redis;

use crate::error::CoreResult;
use async_trait::async_trait;
use std::time::Duration;

pub use self::redis::RedisCache;
pub use memory::MemoryCache;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value; `None` means expired or never set
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;

    /// Store a value that expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()>;
}
