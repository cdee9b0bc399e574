//! Common types used throughout the queue service

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Identifier of a community ("guild") on the chat platform
pub type GuildId = u64;

/// Stable identifier of a participant
pub type ParticipantId = u64;

/// Identifier of a message on the chat platform (used for replies and notices)
pub type MessageId = u64;

/// Opaque handle correlating an announcement with acknowledgements
pub type AckToken = Uuid;

/// Someone waiting in (or interacting with) a guild queue.
///
/// Equality and hashing only consider the id; the display name is a label
/// the collaborator may refresh between sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
}

impl Participant {
    pub fn new(id: ParticipantId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// One line of a roster listing, ranked from 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub rank: usize,
    pub participant: Participant,
}

/// Informational fill level of a roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RosterState {
    Empty,
    Filling,
    Full,
}

/// Roster listing plus the numbers needed to render a "(size/capacity)" title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterView {
    pub entries: Vec<RosterEntry>,
    pub capacity: usize,
    pub state: RosterState,
}

impl RosterView {
    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

/// Whether a reaction confirms an announcement or withdraws the confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckKind {
    Confirm,
    Retract,
}

/// A "turn" announcement made by the head of the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub claimant: Participant,
    pub code: String,
    pub token: AckToken,
    /// Message that triggered the claim, for replying
    pub origin: MessageId,
    pub created_at: DateTime<Utc>,
}

/// Commands a participant (or moderator) can invoke against a guild queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum QueueCommand {
    Join,
    Leave,
    View,
    Remove { target: Participant },
    Empty,
    Promote { target: Participant },
    Demote { target: Participant },
    SetCapacity { value: String },
    Claim { code: Option<String>, origin: MessageId },
    Penalty,
}

impl QueueCommand {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            QueueCommand::Join => "join",
            QueueCommand::Leave => "leave",
            QueueCommand::View => "view",
            QueueCommand::Remove { .. } => "remove",
            QueueCommand::Empty => "empty",
            QueueCommand::Promote { .. } => "promote",
            QueueCommand::Demote { .. } => "demote",
            QueueCommand::SetCapacity { .. } => "cap",
            QueueCommand::Claim { .. } => "claim",
            QueueCommand::Penalty => "penalty",
        }
    }
}

/// Inbound events delivered by the chat-platform collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    GuildJoined {
        guild_id: GuildId,
    },
    GuildLeft {
        guild_id: GuildId,
    },
    CommandInvoked {
        guild_id: GuildId,
        invoker: Participant,
        command: QueueCommand,
    },
    ReactionAdded {
        guild_id: GuildId,
        token: AckToken,
        participant: Participant,
        symbol: String,
    },
    ReactionRemoved {
        guild_id: GuildId,
        token: AckToken,
        participant: Participant,
        symbol: String,
    },
    /// The collaborator posted a fresh roster notice for the guild
    NoticePosted {
        guild_id: GuildId,
        message_id: MessageId,
    },
    TimerFired,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub participant: Participant,
    /// 1-indexed position of the new entry
    pub position: usize,
    pub size: usize,
    /// Set when this join filled the roster to capacity
    pub reached_capacity: bool,
    pub roster: RosterView,
}

/// Result of a leave or a privileged removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    pub participant: Participant,
    pub was_head: bool,
    /// New head to notify, only reported when the head departed
    pub new_head: Option<Participant>,
    /// New second in line to notify, only reported when the head departed
    pub on_deck: Option<Participant>,
    pub roster: RosterView,
}

/// Result of a promote or demote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub participant: Participant,
    /// 1-indexed position after the move
    pub position: usize,
    pub roster: RosterView,
}

/// Result of an acknowledgement reaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AckOutcome {
    Awarded {
        participant: Participant,
        score: i32,
    },
    Undone {
        participant: Participant,
        score: i32,
    },
    Ignored,
}

/// Result of a distress request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DistressOutcome {
    /// Claimant placed back near the front (position is 1-indexed)
    Requeued {
        claimant: Participant,
        position: usize,
        roster: RosterView,
    },
    AlreadyHead {
        claimant: Participant,
    },
    /// Someone other than the claimant reacted; the affordance should be retracted
    Rejected {
        participant: Participant,
    },
    /// Token is unknown or has aged out
    Ignored,
}

/// Notices produced by reputation evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// Removed from the roster for inactivity; deliver a direct message
    Evicted { participant: Participant },
    /// Numbered warning for a waiting participant
    Warning {
        participant: Participant,
        count: i32,
    },
    /// The head is slipping; ask whether they need help
    NeedHelp { participant: Participant },
}

/// Result of a manual penalty or one guild's share of a decay tick
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PenaltyReport {
    pub guild_id: GuildId,
    pub notices: Vec<Notice>,
    /// Present when an eviction changed the roster
    pub roster: Option<RosterView>,
}

impl PenaltyReport {
    pub fn roster_changed(&self) -> bool {
        self.roster.is_some()
    }
}

/// Response returned to the collaborator for every inbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueResponse {
    GuildTracked { guild_id: GuildId },
    GuildDropped { guild_id: GuildId },
    Joined(JoinOutcome),
    Left(Departure),
    Removed(Departure),
    Roster(RosterView),
    Emptied(RosterView),
    Moved(MoveOutcome),
    CapacitySet { capacity: usize },
    Claimed(Announcement),
    Acknowledged(AckOutcome),
    Distress(DistressOutcome),
    Penalized(PenaltyReport),
    Ticked { reports: Vec<PenaltyReport> },
    /// The notice the collaborator should now retract, if any
    NoticeRecorded { replaced: Option<MessageId> },
    Ignored,
    Failed { error: QueueError },
}
