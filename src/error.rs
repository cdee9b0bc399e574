//! Error types for the queue service
//!
//! Core queue operations return [`QueueError`] values directly so callers can
//! match on the kind. Service and transport code uses anyhow for consistent
//! error handling throughout the application.

use crate::types::{GuildId, ParticipantId};
use serde::{Deserialize, Serialize};

/// Result type alias for service code
pub type Result<T> = anyhow::Result<T>;

/// Result type alias for core queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Error kinds surfaced by queue operations. None of them is fatal; a failed
/// operation leaves the guild state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueError {
    #[error("Participant {participant_id} is already queued")]
    AlreadyQueued { participant_id: ParticipantId },

    #[error("Participant {participant_id} is not queued")]
    NotQueued { participant_id: ParticipantId },

    #[error("Queue is full ({capacity} participants)")]
    Full { capacity: usize },

    #[error("Queue is empty")]
    QueueEmpty,

    #[error("Participant {participant_id} is not first in line")]
    NotHead { participant_id: ParticipantId },

    #[error("Participant {participant_id} cannot move further")]
    AlreadyAtBoundary { participant_id: ParticipantId },

    #[error("No claim code given")]
    MissingCode,

    #[error("Invalid claim code: {code}")]
    InvalidCode { code: String },

    #[error("Capacity {value} is outside of {min}..={max}")]
    OutOfRange { value: i64, min: usize, max: usize },

    #[error("{input} is not an integer")]
    NotAnInteger { input: String },

    #[error("Capacity changes are disabled for this deployment")]
    CapacityChangeDisabled,

    #[error("Guild not found: {guild_id}")]
    GuildNotFound { guild_id: GuildId },

    #[error("Internal queue error: {message}")]
    Internal { message: String },
}

impl QueueError {
    /// Stable snake_case name of the error kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::AlreadyQueued { .. } => "already_queued",
            QueueError::NotQueued { .. } => "not_queued",
            QueueError::Full { .. } => "full",
            QueueError::QueueEmpty => "queue_empty",
            QueueError::NotHead { .. } => "not_head",
            QueueError::AlreadyAtBoundary { .. } => "already_at_boundary",
            QueueError::MissingCode => "missing_code",
            QueueError::InvalidCode { .. } => "invalid_code",
            QueueError::OutOfRange { .. } => "out_of_range",
            QueueError::NotAnInteger { .. } => "not_an_integer",
            QueueError::CapacityChangeDisabled => "capacity_change_disabled",
            QueueError::GuildNotFound { .. } => "guild_not_found",
            QueueError::Internal { .. } => "internal",
        }
    }
}

/// Service-level failures (transport, configuration, storage)
#[derive(Debug, thiserror::Error)]
pub enum ServiceFailure {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid event: {reason}")]
    InvalidEvent { reason: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
