//! Guild Queue - per-guild turn queues for chat communities
//!
//! This crate keeps an ordered, capacity-bounded waiting line per guild,
//! hands out turns with claim codes, tracks a reputation score for
//! participants who acknowledge turns and periodically warns or evicts idle
//! ones. Events arrive and responses leave over AMQP.

pub mod amqp;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod reputation;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{QueueError, QueueResult, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::ResponsePublisher;
pub use dispatch::EventDispatcher;
pub use queue::QueueController;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
