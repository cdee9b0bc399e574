//! AMQP message definitions and serialization

use crate::error::{Result, ServiceFailure};
use crate::types::{QueueEvent, QueueResponse};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Queue the chat-platform collaborator publishes events to
pub const QUEUE_EVENTS_QUEUE: &str = "guild_queue.events";
/// Topic exchange responses are published on
pub const QUEUE_RESPONSES_EXCHANGE: &str = "guild_queue.responses";

/// Routing keys for responses
pub const COMMAND_ROUTING_KEY: &str = "response.command";
pub const REACTION_ROUTING_KEY: &str = "response.reaction";
pub const GUILD_ROUTING_KEY: &str = "response.guild";
pub const TICK_ROUTING_KEY: &str = "response.tick";

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(payload: T, routing_key: impl Into<String>) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key: routing_key.into(),
        }
    }

    /// Keep the correlation id of the message being answered
    pub fn reply(payload: T, routing_key: impl Into<String>, correlation_id: String) -> Self {
        Self {
            correlation_id,
            ..Self::new(payload, routing_key)
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            ServiceFailure::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            ServiceFailure::InvalidEvent {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize a queue event to bytes
    pub fn serialize_event(event: &QueueEvent) -> Result<Vec<u8>> {
        Self::validate_event(event)?;
        serde_json::to_vec(event).map_err(|e| {
            ServiceFailure::InternalError {
                message: format!("Failed to serialize queue event: {}", e),
            }
            .into()
        })
    }

    /// Deserialize a queue event from bytes
    pub fn deserialize_event(bytes: &[u8]) -> Result<QueueEvent> {
        let event: QueueEvent =
            serde_json::from_slice(bytes).map_err(|e| ServiceFailure::InvalidEvent {
                reason: format!("Failed to deserialize queue event: {}", e),
            })?;

        Self::validate_event(&event)?;
        Ok(event)
    }

    /// Reject events the collaborator should never send
    pub fn validate_event(event: &QueueEvent) -> Result<()> {
        if let QueueEvent::CommandInvoked { invoker, .. } = event {
            if invoker.display_name.trim().is_empty() {
                return Err(ServiceFailure::InvalidEvent {
                    reason: "Invoker display name cannot be empty".to_string(),
                }
                .into());
            }
        }

        if let QueueEvent::ReactionAdded { symbol, .. }
        | QueueEvent::ReactionRemoved { symbol, .. } = event
        {
            if symbol.is_empty() {
                return Err(ServiceFailure::InvalidEvent {
                    reason: "Reaction symbol cannot be empty".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Routing key for the response to an event
    pub fn routing_key(event: &QueueEvent) -> &'static str {
        match event {
            QueueEvent::GuildJoined { .. }
            | QueueEvent::GuildLeft { .. }
            | QueueEvent::NoticePosted { .. } => GUILD_ROUTING_KEY,
            QueueEvent::CommandInvoked { .. } => COMMAND_ROUTING_KEY,
            QueueEvent::ReactionAdded { .. } | QueueEvent::ReactionRemoved { .. } => {
                REACTION_ROUTING_KEY
            }
            QueueEvent::TimerFired => TICK_ROUTING_KEY,
        }
    }

    /// Wrap a response for publishing
    pub fn envelope(
        event: &QueueEvent,
        response: QueueResponse,
        correlation_id: Option<String>,
    ) -> MessageEnvelope<QueueResponse> {
        let routing_key = Self::routing_key(event);
        match correlation_id {
            Some(id) => MessageEnvelope::reply(response, routing_key, id),
            None => MessageEnvelope::new(response, routing_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Participant, QueueCommand};

    fn create_test_command() -> QueueEvent {
        QueueEvent::CommandInvoked {
            guild_id: 4,
            invoker: Participant::new(8, "celeste"),
            command: QueueCommand::Claim {
                code: Some("A7x92".to_string()),
                origin: 77,
            },
        }
    }

    #[test]
    fn test_message_envelope_creation() {
        let envelope = MessageEnvelope::new(QueueResponse::Ignored, TICK_ROUTING_KEY);

        assert_eq!(envelope.routing_key, "response.tick");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_event_wire_format() {
        let json = r#"{
            "type": "CommandInvoked",
            "guild_id": 4,
            "invoker": {"id": 8, "display_name": "celeste"},
            "command": {"command": "claim", "code": "A7x92", "origin": 77}
        }"#;

        let event = MessageUtils::deserialize_event(json.as_bytes()).unwrap();
        assert_eq!(event, create_test_command());

        let timer = MessageUtils::deserialize_event(br#"{"type": "TimerFired"}"#).unwrap();
        assert_eq!(timer, QueueEvent::TimerFired);
    }

    #[test]
    fn test_event_validation() {
        assert!(MessageUtils::validate_event(&create_test_command()).is_ok());

        let nameless = QueueEvent::CommandInvoked {
            guild_id: 4,
            invoker: Participant::new(8, " "),
            command: QueueCommand::Join,
        };
        assert!(MessageUtils::validate_event(&nameless).is_err());

        let reaction = QueueEvent::ReactionAdded {
            guild_id: 4,
            token: crate::utils::generate_ack_token(),
            participant: Participant::new(8, "celeste"),
            symbol: String::new(),
        };
        assert!(MessageUtils::serialize_event(&reaction).is_err());

        assert!(MessageUtils::deserialize_event(b"{\"type\": \"Unknown\"}").is_err());
    }

    #[test]
    fn test_routing_keys() {
        assert_eq!(
            MessageUtils::routing_key(&create_test_command()),
            COMMAND_ROUTING_KEY
        );
        assert_eq!(
            MessageUtils::routing_key(&QueueEvent::GuildLeft { guild_id: 1 }),
            GUILD_ROUTING_KEY
        );
        assert_eq!(
            MessageUtils::routing_key(&QueueEvent::TimerFired),
            TICK_ROUTING_KEY
        );
    }

    #[test]
    fn test_reply_keeps_correlation_id() {
        let envelope = MessageUtils::envelope(
            &QueueEvent::TimerFired,
            QueueResponse::Ticked { reports: vec![] },
            Some("evt-42".to_string()),
        );
        assert_eq!(envelope.correlation_id, "evt-42");
        assert_eq!(envelope.routing_key, TICK_ROUTING_KEY);

        let bytes = envelope.to_bytes().unwrap();
        let decoded = MessageEnvelope::<QueueResponse>::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.payload, QueueResponse::Ticked { reports: vec![] });
    }
}
