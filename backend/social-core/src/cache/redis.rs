//! Redis-backed cache adapter.
//!
//! Thin wrapper over a shared `ConnectionManager`; transport failures map to
//! `StoreUnavailable` and are downgraded to misses by the feed aggregator.

use super::Cache;
use crate::error::CoreResult;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RedisCache {
    client: Arc<ConnectionManager>,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            client: Arc::new(manager),
        })
    }

    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            client: Arc::new(manager),
        }
    }

    /// Ping Redis to verify the connection is alive
    pub async fn ping(&self) -> CoreResult<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.client.as_ref().clone())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.client.as_ref().clone())
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async::<_, ()>(&mut self.client.as_ref().clone())
            .await?;
        Ok(())
    }
}
