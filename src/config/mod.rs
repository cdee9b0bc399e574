//! Configuration management for the guild-queue service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values for the queue service.

pub mod app;
pub mod queue;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, ServiceSettings};
pub use queue::QueueSettings;
