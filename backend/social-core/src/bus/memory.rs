//! In-process event bus.
//!
//! Delivers inline: a publish awaits every handler registered on the channel,
//! in registration order, before returning. Sequential publishes on one
//! channel therefore arrive in order, matching the substrate contract the
//! Kafka adapter provides in deployments. Used by the test suite, which also
//! exercises duplicate delivery simply by publishing an envelope twice.

use super::{EventBus, EventHandler};
use crate::error::CoreResult;
use async_trait::async_trait;
use event_schema::EventEnvelope;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

#[derive(Default)]
pub struct MemoryEventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a channel
    pub async fn subscribe(&self, channel: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(handler);
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, channel: &str, envelope: EventEnvelope) -> CoreResult<()> {
        let handlers = {
            let registry = self.handlers.read().await;
            registry.get(channel).cloned().unwrap_or_default()
        };

        debug!(
            channel = %channel,
            kind = %envelope.event.kind(),
            handlers = handlers.len(),
            "Delivering event"
        );

        for handler in handlers {
            if let Err(e) = handler.handle(&envelope).await {
                // Consumer isolation: a failing handler never fails the
                // publish or starves later handlers
                error!(
                    channel = %channel,
                    kind = %envelope.event.kind(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }
        Ok(())
    }
}
