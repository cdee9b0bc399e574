//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use guild_queue::amqp::handlers::DispatchingHandler;
use guild_queue::amqp::publisher::RecordingPublisher;
use guild_queue::config::QueueSettings;
use guild_queue::dispatch::EventDispatcher;
use guild_queue::metrics::MetricsCollector;
use guild_queue::queue::QueueController;
use guild_queue::types::{
    AckToken, GuildId, Participant, ParticipantId, QueueCommand, QueueEvent, QueueResponse,
};
use std::sync::Arc;

/// Identity the service runs as in the fixtures
pub const SERVICE_IDENTITY: ParticipantId = 4_000_000;

pub fn participant(id: ParticipantId) -> Participant {
    Participant::new(id, format!("resident{}", id))
}

pub fn test_settings() -> QueueSettings {
    QueueSettings {
        generic_mode: true,
        service_identity: Some(SERVICE_IDENTITY),
        ..Default::default()
    }
}

/// Controller, dispatcher and recording publisher wired together the way
/// the service wires them, minus the broker
pub struct TestSystem {
    pub settings: QueueSettings,
    pub controller: QueueController,
    pub handler: DispatchingHandler,
    pub publisher: Arc<RecordingPublisher>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestSystem {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: QueueSettings) -> Self {
        let controller = QueueController::new((&settings).into());
        let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));
        let dispatcher = Arc::new(EventDispatcher::with_metrics(
            controller.clone(),
            &settings,
            metrics.clone(),
        ));
        let publisher = Arc::new(RecordingPublisher::new());
        let handler =
            DispatchingHandler::new(dispatcher, publisher.clone()).with_metrics(metrics.clone());

        Self {
            settings,
            controller,
            handler,
            publisher,
            metrics,
        }
    }

    /// Dispatch through the handler, as a consumed delivery would be
    pub async fn send(&self, event: QueueEvent) -> QueueResponse {
        use guild_queue::amqp::handlers::MessageHandler;
        self.handler
            .handle_event(event, None)
            .await
            .expect("recording publisher never fails")
    }

    pub async fn track(&self, guild_id: GuildId) -> QueueResponse {
        self.send(QueueEvent::GuildJoined { guild_id }).await
    }

    pub async fn command(
        &self,
        guild_id: GuildId,
        invoker: ParticipantId,
        command: QueueCommand,
    ) -> QueueResponse {
        self.send(command_event(guild_id, invoker, command)).await
    }

    pub async fn react(
        &self,
        guild_id: GuildId,
        reactor: ParticipantId,
        token: AckToken,
        symbol: &str,
    ) -> QueueResponse {
        self.send(QueueEvent::ReactionAdded {
            guild_id,
            token,
            participant: participant(reactor),
            symbol: symbol.to_string(),
        })
        .await
    }

    pub async fn unreact(
        &self,
        guild_id: GuildId,
        reactor: ParticipantId,
        token: AckToken,
        symbol: &str,
    ) -> QueueResponse {
        self.send(QueueEvent::ReactionRemoved {
            guild_id,
            token,
            participant: participant(reactor),
            symbol: symbol.to_string(),
        })
        .await
    }

    pub async fn tick(&self) -> QueueResponse {
        self.send(QueueEvent::TimerFired).await
    }

    pub fn roster_ids(&self, guild_id: GuildId) -> Vec<ParticipantId> {
        roster_ids(&self.controller, guild_id)
    }
}

pub fn command_event(guild_id: GuildId, invoker: ParticipantId, command: QueueCommand) -> QueueEvent {
    QueueEvent::CommandInvoked {
        guild_id,
        invoker: participant(invoker),
        command,
    }
}

pub fn claim(code: &str) -> QueueCommand {
    QueueCommand::Claim {
        code: Some(code.to_string()),
        origin: 1,
    }
}

pub fn roster_ids(controller: &QueueController, guild_id: GuildId) -> Vec<ParticipantId> {
    controller
        .view(guild_id)
        .expect("guild is tracked")
        .entries
        .iter()
        .map(|entry| entry.participant.id)
        .collect()
}
