//! AMQP integration for the guild-queue service
//!
//! This module handles the broker connection, consumption of inbound queue
//! events, and publishing of responses.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{DispatchingHandler, MessageHandler, QueueEventConsumer};
pub use messages::*;
pub use publisher::{AmqpResponsePublisher, PublisherConfig, RecordingPublisher, ResponsePublisher};
