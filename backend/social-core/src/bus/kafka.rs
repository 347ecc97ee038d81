//! Kafka adapter for the event bus contract.
//!
//! Channels map to topics as `{prefix}.{channel}`. Messages are keyed by the
//! event's partition key so everything about one entity stays ordered, and
//! carry an `event_type` header for consumer-side routing.

use super::{EventBus, EventHandler};
use crate::config::KafkaConfig;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use event_schema::{is_compatible, EventEnvelope, SCHEMA_VERSION};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

fn prefixed_topic(prefix: &str, channel: &str) -> String {
    format!("{}.{}", prefix, channel)
}

/// Publishing adapter
#[derive(Clone)]
pub struct KafkaEventBus {
    producer: FutureProducer,
    topic_prefix: String,
}

impl KafkaEventBus {
    pub fn new(config: &KafkaConfig) -> CoreResult<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", "social-core")
            // Idempotency and reliability settings
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "3")
            .set("linger.ms", "5")
            .create::<FutureProducer>()?;

        info!(
            brokers = %config.brokers,
            topic_prefix = %config.topic_prefix,
            "Kafka producer initialized"
        );

        Ok(Self {
            producer,
            topic_prefix: config.topic_prefix.clone(),
        })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, channel: &str, envelope: EventEnvelope) -> CoreResult<()> {
        let topic = prefixed_topic(&self.topic_prefix, channel);
        let payload = serde_json::to_string(&envelope)?;
        let key = envelope.event.partition_key().to_string();

        let headers = OwnedHeaders::new().insert(Header {
            key: "event_type",
            value: Some(envelope.event.kind()),
        });

        let record = FutureRecord::to(&topic)
            .key(&key)
            .payload(&payload)
            .headers(headers);

        match self.producer.send(record, Duration::from_secs(5)).await {
            Ok(_) => {
                info!(
                    topic = %topic,
                    kind = %envelope.event.kind(),
                    partition_key = %key,
                    "Published event"
                );
                Ok(())
            }
            Err((err, _)) => {
                warn!(
                    topic = %topic,
                    kind = %envelope.event.kind(),
                    error = %err,
                    "Failed to publish event"
                );
                Err(CoreError::StoreUnavailable(format!(
                    "failed to publish event: {}",
                    err
                )))
            }
        }
    }
}

/// Consuming adapter: one consumer loop dispatching to the handlers
/// registered per channel
pub struct KafkaEventConsumer {
    consumer: StreamConsumer,
    topic_prefix: String,
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl KafkaEventConsumer {
    pub fn new(config: &KafkaConfig, shutdown_rx: watch::Receiver<bool>) -> CoreResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        Ok(Self {
            consumer,
            topic_prefix: config.topic_prefix.clone(),
            handlers: HashMap::new(),
            shutdown_rx,
        })
    }

    /// Register a handler for a channel; call before [`Self::run`]
    pub fn register(&mut self, channel: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(prefixed_topic(&self.topic_prefix, channel))
            .or_default()
            .push(handler);
    }

    /// Run the consumer loop until the shutdown signal flips
    pub async fn run(&mut self) -> CoreResult<()> {
        use futures::StreamExt;

        let topics: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        if topics.is_empty() {
            return Err(CoreError::Internal(
                "no handlers registered on consumer".to_string(),
            ));
        }
        self.consumer.subscribe(&topics)?;
        info!(topics = ?topics, "Event consumer loop starting");

        let mut message_stream = self.consumer.stream();

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping consumer");
                        break;
                    }
                }

                message = message_stream.next() => {
                    match message {
                        Some(Ok(msg)) => {
                            let topic = msg.topic().to_string();
                            let payload = msg.payload().map(|p| p.to_vec());
                            drop(msg);
                            self.dispatch(&topic, payload.as_deref()).await;
                        }
                        Some(Err(e)) => {
                            // Keep consuming; the substrate retries
                            error!(error = %e, "Kafka consumer error");
                        }
                        None => {
                            warn!("Message stream ended unexpectedly");
                            break;
                        }
                    }
                }
            }
        }

        info!("Event consumer stopped");
        Ok(())
    }

    async fn dispatch(&self, topic: &str, payload: Option<&[u8]>) {
        let payload = match payload {
            Some(p) => p,
            None => {
                debug!(topic = %topic, "Empty message payload, skipping");
                return;
            }
        };

        let envelope: EventEnvelope = match serde_json::from_slice(payload) {
            Ok(e) => e,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Unparseable envelope, skipping");
                return;
            }
        };

        if !is_compatible(SCHEMA_VERSION, envelope.schema_version) {
            warn!(
                topic = %topic,
                version = envelope.schema_version,
                "Incompatible schema version, skipping"
            );
            return;
        }

        let Some(handlers) = self.handlers.get(topic) else {
            return;
        };
        for handler in handlers {
            if let Err(e) = handler.handle(&envelope).await {
                error!(
                    topic = %topic,
                    kind = %envelope.event.kind(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_map_to_prefixed_topics() {
        assert_eq!(
            prefixed_topic("lume", event_schema::channels::SOCIAL),
            "lume.social-events"
        );
    }
}
