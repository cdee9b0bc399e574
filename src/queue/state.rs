//! Queue state of a single guild
//!
//! `GuildQueueState` ties the roster, the reputation ledger and the
//! announcement log together. Every method is synchronous and either fully
//! applies or leaves the state untouched; the controller is responsible for
//! serializing access.

use crate::error::{QueueError, QueueResult};
use crate::queue::announcements::AnnouncementLog;
use crate::queue::roster::Roster;
use crate::reputation::{ReputationLedger, ReputationPolicy, ScoreEntry, Verdict};
use crate::types::{
    AckKind, AckOutcome, AckToken, Announcement, Departure, DistressOutcome, GuildId,
    JoinOutcome, MessageId, MoveOutcome, Notice, Participant, ParticipantId, PenaltyReport,
    RosterView,
};
use crate::utils::{generate_ack_token, is_valid_claim_code};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Serialized form of a guild's queue state. Roster and announcement order
/// are kept as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSnapshot {
    pub guild_id: GuildId,
    pub capacity: usize,
    pub roster: Vec<Participant>,
    pub ledger: Vec<(ParticipantId, ScoreEntry)>,
    pub announcements: Vec<Announcement>,
    pub pending_notice: Option<MessageId>,
}

#[derive(Debug, Clone)]
pub struct GuildQueueState {
    guild_id: GuildId,
    roster: Roster,
    ledger: ReputationLedger,
    announcements: AnnouncementLog,
    pending_notice: Option<MessageId>,
}

impl GuildQueueState {
    pub fn new(guild_id: GuildId, capacity: usize) -> Self {
        Self {
            guild_id,
            roster: Roster::new(capacity),
            ledger: ReputationLedger::new(),
            announcements: AnnouncementLog::new(),
            pending_notice: None,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn ledger(&self) -> &ReputationLedger {
        &self.ledger
    }

    pub fn announcements(&self) -> &AnnouncementLog {
        &self.announcements
    }

    pub fn pending_notice(&self) -> Option<MessageId> {
        self.pending_notice
    }

    pub fn view(&self) -> RosterView {
        self.roster.view()
    }

    /// Remember the latest roster notice. Returns the one it replaces so the
    /// collaborator can retract it.
    pub fn record_notice(&mut self, message_id: MessageId) -> Option<MessageId> {
        self.pending_notice.replace(message_id)
    }

    pub fn join(&mut self, participant: Participant) -> QueueResult<JoinOutcome> {
        let position = self.roster.join(participant.clone())?;
        let size = self.roster.len();

        debug!(
            "Guild {} - {} joined at position {}/{}",
            self.guild_id,
            participant,
            position,
            self.roster.capacity()
        );

        Ok(JoinOutcome {
            participant,
            position,
            size,
            reached_capacity: size == self.roster.capacity(),
            roster: self.roster.view(),
        })
    }

    /// Take a participant out of the roster, either on their own request or
    /// by a moderator. Their reputation is forgotten.
    pub fn depart(
        &mut self,
        participant_id: ParticipantId,
        privileged: bool,
    ) -> QueueResult<Departure> {
        let removal = if privileged {
            self.roster.remove(participant_id)?
        } else {
            self.roster.leave(participant_id)?
        };
        self.ledger.purge(participant_id);

        let (new_head, on_deck) = if removal.was_head {
            (self.roster.head().cloned(), self.roster.second().cloned())
        } else {
            (None, None)
        };

        Ok(Departure {
            participant: removal.participant,
            was_head: removal.was_head,
            new_head,
            on_deck,
            roster: self.roster.view(),
        })
    }

    pub fn promote(&mut self, participant_id: ParticipantId) -> QueueResult<MoveOutcome> {
        let position = self.roster.promote(participant_id)?;
        Ok(self.move_outcome(participant_id, position))
    }

    pub fn demote(&mut self, participant_id: ParticipantId) -> QueueResult<MoveOutcome> {
        let position = self.roster.demote(participant_id)?;
        Ok(self.move_outcome(participant_id, position))
    }

    fn move_outcome(&self, participant_id: ParticipantId, position: usize) -> MoveOutcome {
        // The participant was just moved within the roster
        let participant = self.roster.participants()[position - 1].clone();
        debug_assert_eq!(participant.id, participant_id);
        MoveOutcome {
            participant,
            position,
            roster: self.roster.view(),
        }
    }

    pub fn set_capacity(&mut self, capacity: i64) -> QueueResult<usize> {
        self.roster.set_capacity(capacity)
    }

    /// Empty the roster. Reputation entries stay until their next evaluation
    /// finds the participant gone.
    pub fn clear(&mut self) -> RosterView {
        let dropped = self.roster.clear();
        info!("Guild {} - roster emptied ({} dropped)", self.guild_id, dropped);
        self.roster.view()
    }

    /// Announce the head's turn. Only the head may claim, with a valid code.
    pub fn claim(
        &mut self,
        participant: &Participant,
        code: Option<&str>,
        origin: MessageId,
    ) -> QueueResult<Announcement> {
        let head = self.roster.head().ok_or(QueueError::QueueEmpty)?;
        if head.id != participant.id {
            return Err(QueueError::NotHead {
                participant_id: participant.id,
            });
        }
        let code = code.ok_or(QueueError::MissingCode)?;
        if !is_valid_claim_code(code) {
            return Err(QueueError::InvalidCode {
                code: code.to_string(),
            });
        }

        let announcement = self
            .announcements
            .record(head.clone(), code.to_string(), origin, |_| {
                generate_ack_token()
            })
            .clone();

        info!(
            "Guild {} - {} claimed the turn (token {})",
            self.guild_id, announcement.claimant, announcement.token
        );
        Ok(announcement)
    }

    /// Apply a confirmation or retraction on a tracked announcement
    pub fn acknowledge(
        &mut self,
        reactor: &Participant,
        token: AckToken,
        kind: AckKind,
        policy: &ReputationPolicy,
    ) -> AckOutcome {
        if self.announcements.find(token).is_none() {
            debug!(
                "Guild {} - acknowledgement on unknown token {} ignored",
                self.guild_id, token
            );
            return AckOutcome::Ignored;
        }

        match kind {
            AckKind::Confirm => AckOutcome::Awarded {
                participant: reactor.clone(),
                score: self.ledger.award(reactor.id, policy),
            },
            AckKind::Retract => match self.ledger.undo(reactor.id) {
                Some(score) => AckOutcome::Undone {
                    participant: reactor.clone(),
                    score,
                },
                None => AckOutcome::Ignored,
            },
        }
    }

    /// Put the claimant of an announcement back directly behind the head
    pub fn distress(
        &mut self,
        participant: &Participant,
        token: AckToken,
    ) -> QueueResult<DistressOutcome> {
        let claimant = match self.announcements.find(token) {
            Some(announcement) => announcement.claimant.clone(),
            None => return Ok(DistressOutcome::Ignored),
        };

        if claimant.id != participant.id {
            warn!(
                "Guild {} - distress on {} by {} rejected (claimant is {})",
                self.guild_id, token, participant, claimant
            );
            return Ok(DistressOutcome::Rejected {
                participant: participant.clone(),
            });
        }

        // Alone at the head there is nobody to yield the turn to
        if self.roster.is_head(claimant.id) && self.roster.len() == 1 {
            return Ok(DistressOutcome::AlreadyHead { claimant });
        }

        let index = self.roster.requeue_behind_head(claimant.clone())?;
        self.announcements.remove(token);

        info!(
            "Guild {} - {} requeued at position {} after distress",
            self.guild_id,
            claimant,
            index + 1
        );

        Ok(DistressOutcome::Requeued {
            claimant,
            position: index + 1,
            roster: self.roster.view(),
        })
    }

    /// Penalize one participant and act on the resulting score
    pub fn penalize(
        &mut self,
        participant_id: ParticipantId,
        points: i32,
        policy: &ReputationPolicy,
    ) -> PenaltyReport {
        let mut notices = Vec::new();
        let changed = match self.ledger.penalize(participant_id, points) {
            Some(score) => self.evaluate(participant_id, score, policy, &mut notices),
            None => false,
        };
        self.report(notices, changed)
    }

    /// One decay tick over every tracked participant
    pub fn decay(&mut self, policy: &ReputationPolicy) -> PenaltyReport {
        let mut notices = Vec::new();
        let mut changed = false;

        for participant_id in self.ledger.tracked() {
            let Some(score) = self.ledger.penalize(participant_id, policy.decay.penalty) else {
                continue;
            };
            changed |= self.evaluate(participant_id, score, policy, &mut notices);

            if policy.decay.recovery > 0 {
                self.ledger.recover(participant_id, policy.decay.recovery);
            }
        }

        self.report(notices, changed)
    }

    fn report(&self, notices: Vec<Notice>, roster_changed: bool) -> PenaltyReport {
        PenaltyReport {
            guild_id: self.guild_id,
            notices,
            roster: roster_changed.then(|| self.roster.view()),
        }
    }

    /// Act on a freshly penalized score. Returns whether the roster changed.
    fn evaluate(
        &mut self,
        participant_id: ParticipantId,
        score: i32,
        policy: &ReputationPolicy,
        notices: &mut Vec<Notice>,
    ) -> bool {
        let in_roster = self.roster.contains(participant_id);
        let is_head = self.roster.is_head(participant_id);

        match policy.verdict(score, in_roster, is_head) {
            Verdict::Clear => false,
            Verdict::Evict => match self.roster.remove(participant_id) {
                Ok(removal) => {
                    self.ledger.purge(participant_id);
                    warn!(
                        "Guild {} - {} evicted for inactivity (score {})",
                        self.guild_id, removal.participant, score
                    );
                    notices.push(Notice::Evicted {
                        participant: removal.participant,
                    });
                    true
                }
                Err(_) => false,
            },
            Verdict::Warn { count } => {
                if let Some(participant) = self.participant(participant_id) {
                    info!(
                        "Guild {} - warning {} for {} (score {})",
                        self.guild_id, count, participant, score
                    );
                    notices.push(Notice::Warning { participant, count });
                }
                false
            }
            Verdict::NeedHelp => {
                if let Some(participant) = self.participant(participant_id) {
                    info!(
                        "Guild {} - head {} is slipping (score {})",
                        self.guild_id, participant, score
                    );
                    notices.push(Notice::NeedHelp { participant });
                }
                false
            }
            Verdict::Purge => {
                self.ledger.purge(participant_id);
                debug!(
                    "Guild {} - forgot score of departed participant {}",
                    self.guild_id, participant_id
                );
                false
            }
        }
    }

    fn participant(&self, participant_id: ParticipantId) -> Option<Participant> {
        self.roster
            .participants()
            .iter()
            .find(|p| p.id == participant_id)
            .cloned()
    }

    pub fn snapshot(&self) -> GuildSnapshot {
        GuildSnapshot {
            guild_id: self.guild_id,
            capacity: self.roster.capacity(),
            roster: self.roster.participants().to_vec(),
            ledger: self
                .ledger
                .entries()
                .map(|(id, entry)| (id, *entry))
                .collect(),
            announcements: self.announcements.records().cloned().collect(),
            pending_notice: self.pending_notice,
        }
    }

    pub fn from_snapshot(snapshot: GuildSnapshot) -> Self {
        Self {
            guild_id: snapshot.guild_id,
            roster: Roster::restore(snapshot.roster, snapshot.capacity),
            ledger: ReputationLedger::restore(snapshot.ledger),
            announcements: AnnouncementLog::restore(snapshot.announcements),
            pending_notice: snapshot.pending_notice,
        }
    }
}
