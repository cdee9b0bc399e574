//! Per-participant reputation ("brownie point") ledger
//!
//! Scores are implicit zero until a participant's first confirmed
//! acknowledgement. Every mutation shadows the previous score in a single
//! slot so the last change can be undone exactly once.

use crate::reputation::policy::ReputationPolicy;
use crate::types::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Score of one participant plus the value before the last mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: i32,
    pub prior: Option<i32>,
}

impl ScoreEntry {
    fn shadow(&mut self) {
        self.prior = Some(self.score);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationLedger {
    entries: BTreeMap<ParticipantId, ScoreEntry>,
}

impl ReputationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(entries: impl IntoIterator<Item = (ParticipantId, ScoreEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Current score, if tracked
    pub fn score(&self, participant_id: ParticipantId) -> Option<i32> {
        self.entries.get(&participant_id).map(|entry| entry.score)
    }

    pub fn is_tracked(&self, participant_id: ParticipantId) -> bool {
        self.entries.contains_key(&participant_id)
    }

    /// Credit a confirmed acknowledgement. First-time participants start
    /// being tracked at zero instead of being credited.
    pub fn award(&mut self, participant_id: ParticipantId, policy: &ReputationPolicy) -> i32 {
        match self.entries.get_mut(&participant_id) {
            Some(entry) => {
                entry.shadow();
                entry.score += policy.award_for(entry.score);
                debug!(
                    "Awarded participant {} - score: {} -> {}",
                    participant_id,
                    entry.prior.unwrap_or_default(),
                    entry.score
                );
                entry.score
            }
            None => {
                self.entries.insert(
                    participant_id,
                    ScoreEntry {
                        score: 0,
                        prior: None,
                    },
                );
                debug!("Started tracking participant {}", participant_id);
                0
            }
        }
    }

    /// Take points away. Untracked participants are left alone.
    pub fn penalize(&mut self, participant_id: ParticipantId, points: i32) -> Option<i32> {
        let entry = self.entries.get_mut(&participant_id)?;
        entry.shadow();
        entry.score -= points;
        debug!(
            "Penalized participant {} - score: {} -> {}",
            participant_id,
            entry.prior.unwrap_or_default(),
            entry.score
        );
        Some(entry.score)
    }

    /// Hand points back without touching the shadow, so the preceding
    /// penalty and this recovery undo as one change
    pub fn recover(&mut self, participant_id: ParticipantId, points: i32) -> Option<i32> {
        let entry = self.entries.get_mut(&participant_id)?;
        entry.score += points;
        Some(entry.score)
    }

    /// Restore the shadowed score. No-op when nothing is shadowed.
    pub fn undo(&mut self, participant_id: ParticipantId) -> Option<i32> {
        let entry = self.entries.get_mut(&participant_id)?;
        let prior = entry.prior.take()?;
        entry.score = prior;
        Some(entry.score)
    }

    /// Forget a participant entirely
    pub fn purge(&mut self, participant_id: ParticipantId) -> bool {
        self.entries.remove(&participant_id).is_some()
    }

    /// Tracked participants in ascending id order
    pub fn tracked(&self) -> Vec<ParticipantId> {
        self.entries.keys().copied().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (ParticipantId, &ScoreEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked_at(score: i32) -> ReputationLedger {
        ReputationLedger::restore([(1, ScoreEntry { score, prior: None })])
    }

    #[test]
    fn test_first_award_starts_tracking_at_zero() {
        let policy = ReputationPolicy::default();
        let mut ledger = ReputationLedger::new();

        assert_eq!(ledger.score(1), None);
        assert_eq!(ledger.award(1, &policy), 0);
        assert_eq!(ledger.score(1), Some(0));
        assert_eq!(ledger.award(1, &policy), 2);
    }

    #[test]
    fn test_award_steps() {
        let policy = ReputationPolicy::default();

        let mut ledger = tracked_at(-3);
        assert_eq!(ledger.award(1, &policy), -1);

        let mut ledger = tracked_at(-4);
        assert_eq!(ledger.award(1, &policy), -1);

        let mut ledger = tracked_at(5);
        assert_eq!(ledger.award(1, &policy), 7);
    }

    #[test]
    fn test_penalize_untracked_is_noop() {
        let mut ledger = ReputationLedger::new();
        assert_eq!(ledger.penalize(1, 1), None);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_undo_restores_exact_prior() {
        let policy = ReputationPolicy::default();
        let mut ledger = tracked_at(-5);

        ledger.award(1, &policy);
        assert_eq!(ledger.score(1), Some(-2));
        assert_eq!(ledger.undo(1), Some(-5));

        ledger.penalize(1, 1);
        assert_eq!(ledger.undo(1), Some(-5));
    }

    #[test]
    fn test_undo_is_single_level() {
        let policy = ReputationPolicy::default();
        let mut ledger = tracked_at(0);

        ledger.award(1, &policy);
        ledger.award(1, &policy);
        assert_eq!(ledger.score(1), Some(4));

        assert_eq!(ledger.undo(1), Some(2));
        assert_eq!(ledger.undo(1), None);
        assert_eq!(ledger.score(1), Some(2));
    }

    #[test]
    fn test_undo_without_shadow() {
        let mut ledger = ReputationLedger::new();
        assert_eq!(ledger.undo(1), None);

        let mut ledger = tracked_at(3);
        assert_eq!(ledger.undo(1), None);
        assert_eq!(ledger.score(1), Some(3));
    }

    #[test]
    fn test_recover_keeps_penalty_shadow() {
        let mut ledger = tracked_at(0);
        ledger.penalize(1, 3);
        ledger.recover(1, 1);
        assert_eq!(ledger.score(1), Some(-2));
        assert_eq!(ledger.undo(1), Some(0));
    }

    #[test]
    fn test_purge() {
        let mut ledger = tracked_at(0);
        assert!(ledger.purge(1));
        assert!(!ledger.purge(1));
        assert!(!ledger.is_tracked(1));
    }
}
