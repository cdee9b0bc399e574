//! Queue controller handling every guild's queue state
//!
//! This module provides the `QueueController` that owns one
//! `GuildQueueState` per guild and serializes all operations on it. Each
//! guild sits behind its own mutex, so operations on different guilds run
//! independently while interactive commands and the decay tick never
//! interleave on the same guild. Nothing here blocks on I/O.

use crate::config::QueueSettings;
use crate::error::{QueueError, QueueResult};
use crate::queue::state::{GuildQueueState, GuildSnapshot};
use crate::reputation::ReputationPolicy;
use crate::types::{
    AckKind, AckOutcome, AckToken, Announcement, Departure, DistressOutcome, GuildId,
    JoinOutcome, MessageId, MoveOutcome, Participant, ParticipantId, PenaltyReport, RosterView,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Settings the controller needs from the deployment configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Capacity of newly tracked guilds
    pub default_capacity: usize,
    /// Whether `SetCapacity` is allowed ("generic" deployments)
    pub capacity_change_enabled: bool,
    pub policy: ReputationPolicy,
    /// The service's own identity on the chat platform; its reactions are ignored
    pub service_identity: Option<ParticipantId>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&QueueSettings::default())
    }
}

impl From<&QueueSettings> for ControllerConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            default_capacity: settings.default_capacity,
            capacity_change_enabled: settings.generic_mode,
            policy: settings.reputation_policy(),
            service_identity: settings.service_identity,
        }
    }
}

/// Point-in-time statistics across all guilds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueControllerStats {
    /// Guilds currently tracked
    pub guilds: usize,
    /// Participants waiting across all rosters
    pub participants_waiting: usize,
    /// Participants with a reputation entry
    pub tracked_participants: usize,
    /// Guilds whose roster is at capacity
    pub full_rosters: usize,
    /// Announcements still accepting acknowledgements
    pub live_announcements: usize,
}

type SharedGuild = Arc<Mutex<GuildQueueState>>;

/// Owner of every guild's queue
#[derive(Clone)]
pub struct QueueController {
    guilds: Arc<RwLock<HashMap<GuildId, SharedGuild>>>,
    config: Arc<ControllerConfig>,
}

impl Default for QueueController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl QueueController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            guilds: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Start tracking a guild. An already tracked guild keeps its state.
    /// Returns whether a new state was created.
    pub fn guild_joined(&self, guild_id: GuildId) -> QueueResult<bool> {
        let mut guilds = self.guilds.write().map_err(|_| QueueError::Internal {
            message: "Failed to acquire guilds lock".to_string(),
        })?;

        if guilds.contains_key(&guild_id) {
            debug!("Guild {} already tracked, keeping its queue", guild_id);
            return Ok(false);
        }

        guilds.insert(
            guild_id,
            Arc::new(Mutex::new(GuildQueueState::new(
                guild_id,
                self.config.default_capacity,
            ))),
        );
        info!(
            "Tracking guild {} (capacity {})",
            guild_id, self.config.default_capacity
        );
        Ok(true)
    }

    /// Stop tracking a guild and drop its state. Returns whether it was tracked.
    pub fn guild_left(&self, guild_id: GuildId) -> QueueResult<bool> {
        let mut guilds = self.guilds.write().map_err(|_| QueueError::Internal {
            message: "Failed to acquire guilds lock".to_string(),
        })?;

        let removed = guilds.remove(&guild_id).is_some();
        if removed {
            info!("Dropped queue state of guild {}", guild_id);
        }
        Ok(removed)
    }

    pub fn guild_ids(&self) -> QueueResult<Vec<GuildId>> {
        let guilds = self.guilds.read().map_err(|_| QueueError::Internal {
            message: "Failed to acquire guilds lock".to_string(),
        })?;
        let mut ids: Vec<_> = guilds.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn guild(&self, guild_id: GuildId) -> QueueResult<SharedGuild> {
        let guilds = self.guilds.read().map_err(|_| QueueError::Internal {
            message: "Failed to acquire guilds lock".to_string(),
        })?;
        guilds
            .get(&guild_id)
            .cloned()
            .ok_or(QueueError::GuildNotFound { guild_id })
    }

    fn all_guilds(&self) -> QueueResult<Vec<SharedGuild>> {
        let guilds = self.guilds.read().map_err(|_| QueueError::Internal {
            message: "Failed to acquire guilds lock".to_string(),
        })?;
        Ok(guilds.values().cloned().collect())
    }

    /// Run `operation` with exclusive access to one guild's state
    fn with_guild<T>(
        &self,
        guild_id: GuildId,
        operation: impl FnOnce(&mut GuildQueueState) -> QueueResult<T>,
    ) -> QueueResult<T> {
        let guild = self.guild(guild_id)?;
        let mut state = guild.lock().map_err(|_| QueueError::Internal {
            message: format!("Failed to acquire lock for guild {}", guild_id),
        })?;
        operation(&mut state)
    }

    pub fn join(&self, guild_id: GuildId, participant: Participant) -> QueueResult<JoinOutcome> {
        let outcome = self.with_guild(guild_id, |state| state.join(participant))?;
        info!(
            "Guild {} - {} joined ({}/{})",
            guild_id, outcome.participant, outcome.size, outcome.roster.capacity
        );
        if outcome.reached_capacity {
            info!("Guild {} - roster reached capacity", guild_id);
        }
        Ok(outcome)
    }

    pub fn leave(&self, guild_id: GuildId, participant_id: ParticipantId) -> QueueResult<Departure> {
        let departure = self.with_guild(guild_id, |state| state.depart(participant_id, false))?;
        info!(
            "Guild {} - {} left (was head: {})",
            guild_id, departure.participant, departure.was_head
        );
        Ok(departure)
    }

    /// Privileged removal of another participant
    pub fn remove(
        &self,
        guild_id: GuildId,
        participant_id: ParticipantId,
    ) -> QueueResult<Departure> {
        let departure = self.with_guild(guild_id, |state| state.depart(participant_id, true))?;
        info!(
            "Guild {} - {} removed (was head: {})",
            guild_id, departure.participant, departure.was_head
        );
        Ok(departure)
    }

    pub fn promote(
        &self,
        guild_id: GuildId,
        participant_id: ParticipantId,
    ) -> QueueResult<MoveOutcome> {
        self.with_guild(guild_id, |state| state.promote(participant_id))
    }

    pub fn demote(
        &self,
        guild_id: GuildId,
        participant_id: ParticipantId,
    ) -> QueueResult<MoveOutcome> {
        self.with_guild(guild_id, |state| state.demote(participant_id))
    }

    /// Change a guild's capacity from raw command input
    pub fn set_capacity(&self, guild_id: GuildId, raw: &str) -> QueueResult<usize> {
        if !self.config.capacity_change_enabled {
            return Err(QueueError::CapacityChangeDisabled);
        }
        let capacity: i64 = raw.trim().parse().map_err(|_| QueueError::NotAnInteger {
            input: raw.to_string(),
        })?;

        let capacity = self.with_guild(guild_id, |state| state.set_capacity(capacity))?;
        info!("Guild {} - capacity set to {}", guild_id, capacity);
        Ok(capacity)
    }

    pub fn view(&self, guild_id: GuildId) -> QueueResult<RosterView> {
        self.with_guild(guild_id, |state| Ok(state.view()))
    }

    pub fn clear(&self, guild_id: GuildId) -> QueueResult<RosterView> {
        self.with_guild(guild_id, |state| Ok(state.clear()))
    }

    pub fn claim_turn(
        &self,
        guild_id: GuildId,
        participant: &Participant,
        code: Option<&str>,
        origin: MessageId,
    ) -> QueueResult<Announcement> {
        self.with_guild(guild_id, |state| state.claim(participant, code, origin))
    }

    pub fn acknowledge(
        &self,
        guild_id: GuildId,
        reactor: &Participant,
        token: AckToken,
        kind: AckKind,
    ) -> QueueResult<AckOutcome> {
        if self.is_service_identity(reactor.id) {
            return Ok(AckOutcome::Ignored);
        }

        let outcome = self.with_guild(guild_id, |state| {
            Ok(state.acknowledge(reactor, token, kind, &self.config.policy))
        })?;
        if let AckOutcome::Awarded { participant, score } | AckOutcome::Undone { participant, score } =
            &outcome
        {
            debug!(
                "Guild {} - {:?} by {} on {}, score now {}",
                guild_id, kind, participant, token, score
            );
        }
        Ok(outcome)
    }

    pub fn distress(
        &self,
        guild_id: GuildId,
        participant: &Participant,
        token: AckToken,
    ) -> QueueResult<DistressOutcome> {
        if self.is_service_identity(participant.id) {
            return Ok(DistressOutcome::Ignored);
        }
        self.with_guild(guild_id, |state| state.distress(participant, token))
    }

    /// Manual one-point penalty
    pub fn penalize(
        &self,
        guild_id: GuildId,
        participant_id: ParticipantId,
    ) -> QueueResult<PenaltyReport> {
        self.with_guild(guild_id, |state| {
            Ok(state.penalize(participant_id, 1, &self.config.policy))
        })
    }

    /// Remember the latest roster notice of a guild; returns the one to retract
    pub fn record_notice(
        &self,
        guild_id: GuildId,
        message_id: MessageId,
    ) -> QueueResult<Option<MessageId>> {
        self.with_guild(guild_id, |state| Ok(state.record_notice(message_id)))
    }

    /// Apply one decay tick to every guild. Only guilds where something
    /// happened (a notice or a roster change) are reported.
    pub fn tick(&self) -> QueueResult<Vec<PenaltyReport>> {
        let start_time = Instant::now();
        let guilds = self.all_guilds()?;
        let mut reports = Vec::new();

        for guild in &guilds {
            let mut state = match guild.lock() {
                Ok(state) => state,
                Err(_) => {
                    warn!("Skipping poisoned guild state during decay tick");
                    continue;
                }
            };
            let report = state.decay(&self.config.policy);
            if !report.notices.is_empty() || report.roster_changed() {
                reports.push(report);
            }
        }

        reports.sort_by_key(|report| report.guild_id);
        info!(
            "Decay tick over {} guilds - {} with notices, {:.2}ms",
            guilds.len(),
            reports.len(),
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        Ok(reports)
    }

    fn is_service_identity(&self, participant_id: ParticipantId) -> bool {
        self.config.service_identity == Some(participant_id)
    }

    /// Serialized state of every guild
    pub fn snapshot(&self) -> QueueResult<Vec<GuildSnapshot>> {
        let mut snapshots = Vec::new();
        for guild in self.all_guilds()? {
            let state = guild.lock().map_err(|_| QueueError::Internal {
                message: "Failed to acquire guild lock for snapshot".to_string(),
            })?;
            snapshots.push(state.snapshot());
        }
        snapshots.sort_by_key(|snapshot| snapshot.guild_id);
        Ok(snapshots)
    }

    /// Load stored guild states, replacing any state tracked for the same guilds
    pub fn restore(&self, snapshots: Vec<GuildSnapshot>) -> QueueResult<usize> {
        let mut guilds = self.guilds.write().map_err(|_| QueueError::Internal {
            message: "Failed to acquire guilds lock".to_string(),
        })?;

        let count = snapshots.len();
        for snapshot in snapshots {
            let guild_id = snapshot.guild_id;
            guilds.insert(
                guild_id,
                Arc::new(Mutex::new(GuildQueueState::from_snapshot(snapshot))),
            );
        }
        info!("Restored queue state for {} guilds", count);
        Ok(count)
    }

    pub fn get_stats(&self) -> QueueResult<QueueControllerStats> {
        let guilds = self.all_guilds()?;
        let mut stats = QueueControllerStats {
            guilds: guilds.len(),
            ..Default::default()
        };

        for guild in guilds {
            let state = guild.lock().map_err(|_| QueueError::Internal {
                message: "Failed to acquire guild lock for stats".to_string(),
            })?;
            stats.participants_waiting += state.roster().len();
            stats.tracked_participants += state.ledger().len();
            stats.live_announcements += state.announcements().len();
            if state.roster().is_full() {
                stats.full_rosters += 1;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
impl QueueController {
    /// Panic while holding the guild map's write lock
    pub(crate) fn poison_guilds(&self) {
        let guilds = self.guilds.clone();
        let _ = std::thread::spawn(move || {
            let _guard = guilds.write().unwrap();
            panic!("poisoning the guild map");
        })
        .join();
    }
}
