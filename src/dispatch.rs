//! Routing of inbound queue events to controller operations
//!
//! The dispatcher turns every `QueueEvent` into exactly one `QueueResponse`.
//! Operation failures never escape as errors; they become
//! `QueueResponse::Failed` so the collaborator can render them.

use crate::config::QueueSettings;
use crate::error::{QueueError, QueueResult};
use crate::metrics::MetricsCollector;
use crate::queue::QueueController;
use crate::types::{
    AckKind, AckToken, GuildId, Participant, QueueCommand, QueueEvent, QueueResponse,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct EventDispatcher {
    controller: QueueController,
    ack_symbol: String,
    distress_symbol: String,
    metrics: Option<Arc<MetricsCollector>>,
}

impl EventDispatcher {
    pub fn new(controller: QueueController, settings: &QueueSettings) -> Self {
        Self {
            controller,
            ack_symbol: settings.ack_symbol.clone(),
            distress_symbol: settings.distress_symbol.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(
        controller: QueueController,
        settings: &QueueSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new(controller, settings)
        }
    }

    pub fn controller(&self) -> &QueueController {
        &self.controller
    }

    pub fn dispatch(&self, event: QueueEvent) -> QueueResponse {
        match event {
            QueueEvent::GuildJoined { guild_id } => {
                respond(self.controller.guild_joined(guild_id).map(|_| {
                    QueueResponse::GuildTracked { guild_id }
                }))
            }
            QueueEvent::GuildLeft { guild_id } => {
                respond(self.controller.guild_left(guild_id).map(|tracked| {
                    if !tracked {
                        debug!("Guild {} left but was never tracked", guild_id);
                    }
                    QueueResponse::GuildDropped { guild_id }
                }))
            }
            QueueEvent::CommandInvoked {
                guild_id,
                invoker,
                command,
            } => self.dispatch_command(guild_id, invoker, command),
            QueueEvent::ReactionAdded {
                guild_id,
                token,
                participant,
                symbol,
            } => self.dispatch_reaction(guild_id, token, participant, &symbol, true),
            QueueEvent::ReactionRemoved {
                guild_id,
                token,
                participant,
                symbol,
            } => self.dispatch_reaction(guild_id, token, participant, &symbol, false),
            QueueEvent::NoticePosted {
                guild_id,
                message_id,
            } => respond(
                self.controller
                    .record_notice(guild_id, message_id)
                    .map(|replaced| QueueResponse::NoticeRecorded { replaced }),
            ),
            QueueEvent::TimerFired => self.dispatch_tick(),
        }
    }

    fn dispatch_command(
        &self,
        guild_id: GuildId,
        invoker: Participant,
        command: QueueCommand,
    ) -> QueueResponse {
        let start_time = Instant::now();
        let label = command.label();
        debug!("Guild {} - {} invoked '{}'", guild_id, invoker, label);

        let controller = &self.controller;
        let result = match command {
            QueueCommand::Join => controller
                .join(guild_id, invoker.clone())
                .map(QueueResponse::Joined),
            QueueCommand::Leave => controller
                .leave(guild_id, invoker.id)
                .map(QueueResponse::Left),
            QueueCommand::View => controller.view(guild_id).map(QueueResponse::Roster),
            QueueCommand::Remove { target } => controller
                .remove(guild_id, target.id)
                .map(QueueResponse::Removed),
            QueueCommand::Empty => controller.clear(guild_id).map(QueueResponse::Emptied),
            QueueCommand::Promote { target } => controller
                .promote(guild_id, target.id)
                .map(QueueResponse::Moved),
            QueueCommand::Demote { target } => controller
                .demote(guild_id, target.id)
                .map(QueueResponse::Moved),
            QueueCommand::SetCapacity { value } => controller
                .set_capacity(guild_id, &value)
                .map(|capacity| QueueResponse::CapacitySet { capacity }),
            QueueCommand::Claim { code, origin } => controller
                .claim_turn(guild_id, &invoker, code.as_deref(), origin)
                .map(QueueResponse::Claimed),
            QueueCommand::Penalty => controller
                .penalize(guild_id, invoker.id)
                .map(QueueResponse::Penalized),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_command(label, result.as_ref().err(), start_time.elapsed());
            if let Ok(QueueResponse::Penalized(report)) = &result {
                metrics.record_notices(&report.notices);
            }
        }
        if let Err(e) = &result {
            info!("Guild {} - '{}' by {} failed: {}", guild_id, label, invoker, e);
        }

        respond(result)
    }

    fn dispatch_reaction(
        &self,
        guild_id: GuildId,
        token: AckToken,
        participant: Participant,
        symbol: &str,
        added: bool,
    ) -> QueueResponse {
        if symbol == self.ack_symbol {
            let kind = if added {
                AckKind::Confirm
            } else {
                AckKind::Retract
            };
            let result = self
                .controller
                .acknowledge(guild_id, &participant, token, kind);
            if let (Some(metrics), Ok(outcome)) = (&self.metrics, &result) {
                metrics.record_acknowledgement(outcome);
            }
            return respond(result.map(QueueResponse::Acknowledged));
        }

        if added && symbol == self.distress_symbol {
            let result = self.controller.distress(guild_id, &participant, token);
            if let (Some(metrics), Ok(outcome)) = (&self.metrics, &result) {
                metrics.record_distress(outcome);
            }
            return respond(result.map(QueueResponse::Distress));
        }

        debug!(
            "Guild {} - ignoring reaction '{}' by {}",
            guild_id, symbol, participant
        );
        QueueResponse::Ignored
    }

    fn dispatch_tick(&self) -> QueueResponse {
        let start_time = Instant::now();
        let result = self.controller.tick();

        if let (Some(metrics), Ok(reports)) = (&self.metrics, &result) {
            metrics.record_tick(reports, start_time.elapsed());
        }

        respond(result.map(|reports| QueueResponse::Ticked { reports }))
    }
}

fn respond(result: QueueResult<QueueResponse>) -> QueueResponse {
    result.unwrap_or_else(|error| {
        if matches!(error, QueueError::Internal { .. }) {
            warn!("Internal queue failure: {}", error);
        }
        QueueResponse::Failed { error }
    })
}
