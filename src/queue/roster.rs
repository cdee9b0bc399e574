//! Ordered, capacity-bounded roster of participants
//!
//! The roster is the waiting line itself: position 0 is the head (whoever
//! currently owns the turn). It never holds a participant twice and never
//! grows past its capacity through a join.

use crate::error::{QueueError, QueueResult};
use crate::types::{Participant, ParticipantId, RosterEntry, RosterState, RosterView};
use serde::{Deserialize, Serialize};

/// Smallest accepted capacity
pub const MIN_CAPACITY: usize = 2;

/// Largest accepted capacity
pub const MAX_CAPACITY: usize = 100;

/// Capacity of a freshly created roster
pub const DEFAULT_CAPACITY: usize = 10;

/// A participant taken out of the roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub participant: Participant,
    /// Whether the participant was at position 0 before removal
    pub was_head: bool,
}

/// The ordered waiting line of one guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    participants: Vec<Participant>,
    capacity: usize,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Roster {
    /// Create an empty roster. The capacity is clamped into the valid range.
    pub fn new(capacity: usize) -> Self {
        Self {
            participants: Vec::new(),
            capacity: capacity.clamp(MIN_CAPACITY, MAX_CAPACITY),
        }
    }

    /// Rebuild a roster from stored order. Entries past the first occurrence
    /// of an id are dropped; the capacity is not enforced against the stored
    /// length (a lowered capacity only constrains future joins).
    pub fn restore(participants: Vec<Participant>, capacity: usize) -> Self {
        let mut roster = Self::new(capacity);
        for participant in participants {
            if !roster.contains(participant.id) {
                roster.participants.push(participant);
            }
        }
        roster
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity
    }

    pub fn state(&self) -> RosterState {
        if self.is_empty() {
            RosterState::Empty
        } else if self.is_full() {
            RosterState::Full
        } else {
            RosterState::Filling
        }
    }

    pub fn contains(&self, participant_id: ParticipantId) -> bool {
        self.position(participant_id).is_some()
    }

    /// 0-based index of a participant
    pub fn position(&self, participant_id: ParticipantId) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.id == participant_id)
    }

    pub fn head(&self) -> Option<&Participant> {
        self.participants.first()
    }

    pub fn second(&self) -> Option<&Participant> {
        self.participants.get(1)
    }

    pub fn is_head(&self, participant_id: ParticipantId) -> bool {
        self.head().is_some_and(|p| p.id == participant_id)
    }

    /// Append a participant to the tail. Returns the 1-indexed position.
    pub fn join(&mut self, participant: Participant) -> QueueResult<usize> {
        if self.contains(participant.id) {
            return Err(QueueError::AlreadyQueued {
                participant_id: participant.id,
            });
        }
        if self.is_full() {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        self.participants.push(participant);
        Ok(self.participants.len())
    }

    /// Remove a participant on their own request
    pub fn leave(&mut self, participant_id: ParticipantId) -> QueueResult<Removal> {
        let index = self
            .position(participant_id)
            .ok_or(QueueError::NotQueued { participant_id })?;

        let participant = self.participants.remove(index);
        Ok(Removal {
            participant,
            was_head: index == 0,
        })
    }

    /// Remove a participant on someone else's request (moderators, eviction)
    pub fn remove(&mut self, participant_id: ParticipantId) -> QueueResult<Removal> {
        self.leave(participant_id)
    }

    /// Swap a participant with the one ahead. Returns the new 1-indexed position.
    pub fn promote(&mut self, participant_id: ParticipantId) -> QueueResult<usize> {
        let index = self
            .position(participant_id)
            .ok_or(QueueError::NotQueued { participant_id })?;
        if index == 0 {
            return Err(QueueError::AlreadyAtBoundary { participant_id });
        }

        self.participants.swap(index, index - 1);
        Ok(index)
    }

    /// Swap a participant with the one behind. Returns the new 1-indexed position.
    pub fn demote(&mut self, participant_id: ParticipantId) -> QueueResult<usize> {
        let index = self
            .position(participant_id)
            .ok_or(QueueError::NotQueued { participant_id })?;
        if index + 1 == self.participants.len() {
            return Err(QueueError::AlreadyAtBoundary { participant_id });
        }

        self.participants.swap(index, index + 1);
        Ok(index + 2)
    }

    /// Change the capacity for future joins. Existing entries are never evicted.
    pub fn set_capacity(&mut self, capacity: i64) -> QueueResult<usize> {
        let valid = MIN_CAPACITY as i64..=MAX_CAPACITY as i64;
        if !valid.contains(&capacity) {
            return Err(QueueError::OutOfRange {
                value: capacity,
                min: MIN_CAPACITY,
                max: MAX_CAPACITY,
            });
        }

        self.capacity = capacity as usize;
        Ok(self.capacity)
    }

    /// Empty the roster. Returns how many participants were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.participants.len();
        self.participants.clear();
        count
    }

    /// Place a participant directly behind the head, moving them out of their
    /// current slot first. On an empty roster they become the head.
    /// Returns the 0-based index they end up at.
    pub fn requeue_behind_head(&mut self, participant: Participant) -> QueueResult<usize> {
        let present = self.contains(participant.id);
        if !present && self.is_full() {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        self.participants.retain(|p| p.id != participant.id);
        let index = self.participants.len().min(1);
        self.participants.insert(index, participant);
        Ok(index)
    }

    /// Ranked listing, 1-indexed. Lazy, and restartable by cloning the
    /// iterator or calling again.
    pub fn snapshot(&self) -> impl Iterator<Item = (usize, &Participant)> + Clone + '_ {
        self.participants
            .iter()
            .enumerate()
            .map(|(index, participant)| (index + 1, participant))
    }

    /// Owned listing for the collaborator to render
    pub fn view(&self) -> RosterView {
        RosterView {
            entries: self
                .snapshot()
                .map(|(rank, participant)| RosterEntry {
                    rank,
                    participant: participant.clone(),
                })
                .collect(),
            capacity: self.capacity,
            state: self.state(),
        }
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }
}
