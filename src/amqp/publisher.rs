//! AMQP publisher for outbound queue responses

use crate::amqp::messages::{MessageEnvelope, QUEUE_RESPONSES_EXCHANGE};
use crate::error::{Result, ServiceFailure};
use crate::types::QueueResponse;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Correlation ids remembered for deduplication
const DEDUPLICATION_WINDOW: usize = 4096;

/// Sink for responses produced by the dispatcher
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponsePublisher: Send + Sync {
    async fn publish_response(&self, envelope: MessageEnvelope<QueueResponse>) -> Result<()>;
}

/// Configuration for response publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: QUEUE_RESPONSES_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
        }
    }
}

/// Bounded set of correlation ids already published
#[derive(Debug, Default)]
struct PublishedIds {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl PublishedIds {
    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    fn insert(&mut self, id: String) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > DEDUPLICATION_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }
}

/// AMQP-based response publisher
pub struct AmqpResponsePublisher {
    channel: Channel,
    config: PublisherConfig,
    published: Mutex<PublishedIds>,
}

impl AmqpResponsePublisher {
    /// Create a publisher and declare its exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            published: Mutex::new(PublishedIds::default()),
        };

        publisher.setup_exchange().await?;

        Ok(publisher)
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange, "topic")
            .durable(true)
            .finish();
        self.channel.exchange_declare(args).await.map_err(|e| {
            ServiceFailure::AmqpConnectionFailed {
                message: format!("Failed to declare responses exchange: {}", e),
            }
        })?;

        info!("Declared responses exchange '{}'", self.config.exchange);
        Ok(())
    }

    fn already_published(&self, correlation_id: &str) -> Result<bool> {
        let published = self
            .published
            .lock()
            .map_err(|_| ServiceFailure::InternalError {
                message: "Failed to acquire published messages lock".to_string(),
            })?;
        Ok(published.contains(correlation_id))
    }

    fn mark_published(&self, correlation_id: &str) -> Result<()> {
        let mut published = self
            .published
            .lock()
            .map_err(|_| ServiceFailure::InternalError {
                message: "Failed to acquire published messages lock".to_string(),
            })?;
        published.insert(correlation_id.to_string());
        Ok(())
    }

    /// Single publish attempt
    async fn try_publish(&self, envelope: &MessageEnvelope<QueueResponse>) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_correlation_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| ServiceFailure::AmqpConnectionFailed {
                message: format!("Failed to publish response: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl ResponsePublisher for AmqpResponsePublisher {
    async fn publish_response(&self, envelope: MessageEnvelope<QueueResponse>) -> Result<()> {
        if self.config.enable_deduplication && self.already_published(&envelope.correlation_id)? {
            debug!(
                "Response {} already published, skipping",
                envelope.correlation_id
            );
            return Ok(());
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(&envelope).await {
                Ok(()) => {
                    if self.config.enable_deduplication {
                        self.mark_published(&envelope.correlation_id)?;
                    }
                    debug!(
                        "Published response {} with routing key {}",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish response {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for response {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }
}

/// Publisher that keeps every envelope in memory, for dry runs and tests
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<MessageEnvelope<QueueResponse>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<MessageEnvelope<QueueResponse>> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut published) = self.published.lock() {
            published.clear();
        }
    }
}

#[async_trait]
impl ResponsePublisher for RecordingPublisher {
    async fn publish_response(&self, envelope: MessageEnvelope<QueueResponse>) -> Result<()> {
        let mut published = self
            .published
            .lock()
            .map_err(|_| ServiceFailure::InternalError {
                message: "Recording publisher lock poisoned".to_string(),
            })?;
        published.push(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::messages::TICK_ROUTING_KEY;

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.exchange, "guild_queue.responses");
        assert_eq!(config.max_retries, 3);
        assert!(config.enable_deduplication);
    }

    #[test]
    fn test_published_ids_window() {
        let mut ids = PublishedIds::default();
        ids.insert("first".to_string());
        ids.insert("first".to_string());
        assert_eq!(ids.order.len(), 1);

        for i in 0..DEDUPLICATION_WINDOW {
            ids.insert(format!("id-{}", i));
        }
        assert_eq!(ids.order.len(), DEDUPLICATION_WINDOW);
        assert!(!ids.contains("first"));
        assert!(ids.contains("id-0"));
    }

    #[tokio::test]
    async fn test_recording_publisher() {
        let publisher = RecordingPublisher::new();
        publisher
            .publish_response(MessageEnvelope::new(QueueResponse::Ignored, TICK_ROUTING_KEY))
            .await
            .unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload, QueueResponse::Ignored);

        publisher.clear();
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_publisher_expectations() {
        let mut publisher = MockResponsePublisher::new();
        publisher
            .expect_publish_response()
            .withf(|envelope| envelope.routing_key == TICK_ROUTING_KEY)
            .times(1)
            .returning(|_| Ok(()));

        publisher
            .publish_response(MessageEnvelope::new(
                QueueResponse::Ticked { reports: vec![] },
                TICK_ROUTING_KEY,
            ))
            .await
            .unwrap();
    }
}
