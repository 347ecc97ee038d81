//! In-memory TTL cache for tests and local development.

use super::Cache;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CoreError::Internal("cache lock poisoned".to_string()))?;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CoreError::Internal("cache lock poisoned".to_string()))?;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}
