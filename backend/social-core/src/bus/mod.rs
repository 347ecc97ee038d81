//! Typed publish/subscribe façade over the event bus collaborator.
//!
//! The substrate guarantees per-channel ordering and at-least-once delivery;
//! duplicates are possible and every registered handler must converge when
//! redelivered the same envelope. Handler failures are consumer-local: they
//! are logged and never propagate back to the publisher.

pub mod kafka;
pub mod memory;

use crate::error::CoreResult;
use async_trait::async_trait;
use event_schema::EventEnvelope;

pub use kafka::{KafkaEventBus, KafkaEventConsumer};
pub use memory::MemoryEventBus;

/// A consumer of delivered envelopes
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> CoreResult<()>;
}

/// Publishing half of the bus
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an envelope to a named channel. Completion means the
    /// substrate accepted the message, not that any consumer ran.
    async fn publish(&self, channel: &str, envelope: EventEnvelope) -> CoreResult<()>;
}
