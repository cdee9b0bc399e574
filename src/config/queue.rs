//! Queue behaviour settings
//!
//! Capacity defaults, the decay tick interval and the reputation policy,
//! plus the chat-surface details (prefixes, reaction symbols, own identity)
//! the collaborator and the dispatcher share.

use crate::queue::roster::{DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY};
use crate::reputation::{DecayPolicy, ReputationPolicy};
use crate::types::ParticipantId;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Capacity of newly tracked guilds
    pub default_capacity: usize,
    /// Seconds between decay ticks
    pub tick_interval_seconds: u64,
    /// Generic deployments allow guilds to change their capacity
    pub generic_mode: bool,
    /// Command prefixes recognised by the chat-platform collaborator
    pub command_prefixes: Vec<String>,
    /// The service's own participant id; its reactions are ignored
    pub service_identity: Option<ParticipantId>,
    /// Reaction symbol that confirms an announcement
    pub ack_symbol: String,
    /// Reaction symbol a claimant uses to ask to be put back in line
    pub distress_symbol: String,
    pub reputation: ReputationPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            tick_interval_seconds: 600, // 10 minutes
            generic_mode: false,
            command_prefixes: vec!["t?".to_string(), "T?".to_string()],
            service_identity: None,
            ack_symbol: "<:watering_can:707933922125676634>".to_string(),
            distress_symbol: "🆘".to_string(),
            reputation: ReputationPolicy::default(),
        }
    }
}

impl QueueSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn decay(&self) -> DecayPolicy {
        self.reputation.decay
    }

    pub fn reputation_policy(&self) -> ReputationPolicy {
        self.reputation
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&self.default_capacity) {
            return Err(anyhow!(
                "Default capacity {} is outside of {}..={}",
                self.default_capacity,
                MIN_CAPACITY,
                MAX_CAPACITY
            ));
        }
        if self.tick_interval_seconds == 0 {
            return Err(anyhow!("Tick interval must be greater than 0"));
        }
        if self.command_prefixes.iter().all(|prefix| prefix.is_empty()) {
            return Err(anyhow!("At least one command prefix is required"));
        }
        if self.ack_symbol.is_empty() || self.distress_symbol.is_empty() {
            return Err(anyhow!("Reaction symbols cannot be empty"));
        }
        if self.ack_symbol == self.distress_symbol {
            return Err(anyhow!(
                "Acknowledgement and distress symbols must differ"
            ));
        }
        self.reputation.validate()
    }
}
