//! AMQP message handlers for processing inbound queue events
//!
//! Deliveries on the events queue are decoded, routed through the
//! `EventDispatcher` and answered on the responses exchange.

use crate::amqp::messages::{MessageEnvelope, MessageUtils};
use crate::amqp::publisher::ResponsePublisher;
use crate::dispatch::EventDispatcher;
use crate::error::{Result, ServiceFailure};
use crate::metrics::MetricsCollector;
use crate::types::{QueueEvent, QueueResponse};
use amqprs::{
    channel::{
        BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, BasicNackArguments,
        Channel,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Trait defining the interface for handling inbound events
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one decoded event, publishing its response. Errors mean the
    /// event was not dispatched.
    async fn handle_event(
        &self,
        event: QueueEvent,
        correlation_id: Option<String>,
    ) -> Result<QueueResponse>;

    /// Handle a delivery that could not be processed
    async fn handle_error(&self, error: anyhow::Error, message_data: &[u8]);
}

/// Events remembered by correlation id so redeliveries are not applied twice
const HANDLED_EVENTS_WINDOW: usize = 4096;

/// Responses held for republishing after the broker refused them
const UNDELIVERED_LIMIT: usize = 1024;

/// Bounded map of correlation ids to the response already computed for them
#[derive(Debug, Default)]
struct HandledEvents {
    responses: HashMap<String, QueueResponse>,
    order: VecDeque<String>,
}

impl HandledEvents {
    fn get(&self, correlation_id: &str) -> Option<QueueResponse> {
        self.responses.get(correlation_id).cloned()
    }

    fn insert(&mut self, correlation_id: String, response: QueueResponse) {
        if self
            .responses
            .insert(correlation_id.clone(), response)
            .is_none()
        {
            self.order.push_back(correlation_id);
        }
        while self.order.len() > HANDLED_EVENTS_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.responses.remove(&oldest);
            }
        }
    }
}

/// Handler that dispatches events to the queue controller.
///
/// Once an event has been dispatched its delivery counts as handled: a
/// response the broker refuses is held and republished later instead of
/// failing the delivery.
pub struct DispatchingHandler {
    dispatcher: Arc<EventDispatcher>,
    publisher: Arc<dyn ResponsePublisher>,
    metrics: Option<Arc<MetricsCollector>>,
    handled: Mutex<HandledEvents>,
    undelivered: tokio::sync::Mutex<VecDeque<MessageEnvelope<QueueResponse>>>,
}

impl DispatchingHandler {
    pub fn new(dispatcher: Arc<EventDispatcher>, publisher: Arc<dyn ResponsePublisher>) -> Self {
        Self {
            dispatcher,
            publisher,
            metrics: None,
            handled: Mutex::new(HandledEvents::default()),
            undelivered: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Decode raw bytes and handle the resulting event
    pub async fn handle_message(
        &self,
        content: &[u8],
        correlation_id: Option<String>,
    ) -> Result<QueueResponse> {
        let event = MessageUtils::deserialize_event(content)?;
        self.handle_event(event, correlation_id).await
    }

    /// Responses waiting to be republished
    pub async fn undelivered_count(&self) -> usize {
        self.undelivered.lock().await.len()
    }

    /// Publish held responses in order, stopping at the first refusal.
    /// Returns how many were delivered.
    pub async fn flush_undelivered(&self) -> usize {
        let mut undelivered = self.undelivered.lock().await;
        let mut delivered = 0;

        while let Some(envelope) = undelivered.front().cloned() {
            let start_time = Instant::now();
            let published = self.publisher.publish_response(envelope).await;
            if let Some(metrics) = &self.metrics {
                metrics.record_amqp_operation("publish", published.is_ok(), start_time.elapsed());
            }

            match published {
                Ok(()) => {
                    undelivered.pop_front();
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        "Response publish failed, holding {} responses for retry: {}",
                        undelivered.len(),
                        e
                    );
                    break;
                }
            }
        }

        if delivered > 0 {
            info!("Republished {} held responses", delivered);
        }
        delivered
    }

    async fn hold(&self, envelope: MessageEnvelope<QueueResponse>) {
        let mut undelivered = self.undelivered.lock().await;
        undelivered.push_back(envelope);
        while undelivered.len() > UNDELIVERED_LIMIT {
            if let Some(dropped) = undelivered.pop_front() {
                error!(
                    "Dropping undelivered response {} ({} held)",
                    dropped.correlation_id, UNDELIVERED_LIMIT
                );
            }
        }
    }

    fn already_handled(&self, correlation_id: &str) -> Result<Option<QueueResponse>> {
        let handled = self
            .handled
            .lock()
            .map_err(|_| ServiceFailure::InternalError {
                message: "Failed to acquire handled events lock".to_string(),
            })?;
        Ok(handled.get(correlation_id))
    }

    fn mark_handled(&self, correlation_id: &str, response: &QueueResponse) {
        match self.handled.lock() {
            Ok(mut handled) => handled.insert(correlation_id.to_string(), response.clone()),
            Err(_) => warn!(
                "Handled events lock poisoned, {} may be applied again on redelivery",
                correlation_id
            ),
        }
    }
}

#[async_trait]
impl MessageHandler for DispatchingHandler {
    async fn handle_event(
        &self,
        event: QueueEvent,
        correlation_id: Option<String>,
    ) -> Result<QueueResponse> {
        if let Some(id) = &correlation_id {
            if let Some(response) = self.already_handled(id)? {
                debug!("Event {} already handled, not dispatching again", id);
                return Ok(response);
            }
        }

        debug!("Dispatching {:?}", event);

        let response = self.dispatcher.dispatch(event.clone());
        if let Some(id) = &correlation_id {
            self.mark_handled(id, &response);
        }

        // Older held responses go out first
        let envelope = MessageUtils::envelope(&event, response.clone(), correlation_id);
        self.hold(envelope).await;
        self.flush_undelivered().await;

        Ok(response)
    }

    async fn handle_error(&self, error: anyhow::Error, message_data: &[u8]) {
        error!(
            "Event handling failed - error: '{}', message_size: {} bytes",
            error,
            message_data.len()
        );

        if !message_data.is_empty() {
            let preview_len = std::cmp::min(100, message_data.len());
            let preview = String::from_utf8_lossy(&message_data[..preview_len]);
            debug!("Message preview: {:?}", preview);
        }
    }
}

/// Consumer for the inbound events queue
pub struct QueueEventConsumer {
    handler: Arc<DispatchingHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl QueueEventConsumer {
    pub fn new(handler: Arc<DispatchingHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("guild-queue-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(EventConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| ServiceFailure::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming events from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel
            .basic_cancel(args)
            .await
            .map_err(|e| ServiceFailure::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            })?;

        info!("Stopped consuming events");
        Ok(())
    }
}

struct EventConsumer {
    handler: Arc<DispatchingHandler>,
}

impl EventConsumer {
    fn new(handler: Arc<DispatchingHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl AsyncConsumer for EventConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            deliver.routing_key(),
            content.len()
        );

        let start_time = Instant::now();
        let correlation_id = basic_properties.correlation_id().cloned();

        let result = self.handler.handle_message(&content, correlation_id).await;
        let processing_time = start_time.elapsed();

        if let Some(metrics) = &self.handler.metrics {
            metrics.record_amqp_operation("consume", result.is_ok(), processing_time);
        }

        match result {
            Ok(response) => {
                debug!(
                    "Event processed - delivery_tag: {}, processing_time: {:.2}ms, response: {:?}",
                    delivery_tag,
                    processing_time.as_secs_f64() * 1000.0,
                    response
                );
                if let Err(e) = channel
                    .basic_ack(BasicAckArguments::new(delivery_tag, false))
                    .await
                {
                    warn!("Failed to ack delivery {}: {}", delivery_tag, e);
                }
            }
            Err(e) => {
                // Only failures before dispatch reach here. Malformed events
                // are dropped rather than redelivered forever
                let requeue = e
                    .downcast_ref::<ServiceFailure>()
                    .map(|failure| !matches!(failure, ServiceFailure::InvalidEvent { .. }))
                    .unwrap_or(true);

                self.handler.handle_error(e, &content).await;

                if let Err(e) = channel
                    .basic_nack(BasicNackArguments::new(delivery_tag, false, requeue))
                    .await
                {
                    warn!("Failed to nack delivery {}: {}", delivery_tag, e);
                }
            }
        }
    }
}
