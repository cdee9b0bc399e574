//! Bounded history of turn announcements
//!
//! Only the five most recent announcements are tracked; acknowledgements on
//! anything older are ignored.

use crate::types::{AckToken, Announcement, MessageId, Participant};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of announcements kept per guild
pub const ANNOUNCEMENT_HISTORY: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementLog {
    records: VecDeque<Announcement>,
}

impl AnnouncementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored records, oldest first. Only the newest
    /// [`ANNOUNCEMENT_HISTORY`] are kept.
    pub fn restore(records: Vec<Announcement>) -> Self {
        let mut log = Self::new();
        for record in records {
            log.push(record);
        }
        log
    }

    /// Record a new announcement. The token is produced by `ack_builder`
    /// so callers control how acknowledgement handles are minted.
    pub fn record<F>(
        &mut self,
        claimant: Participant,
        code: String,
        origin: MessageId,
        ack_builder: F,
    ) -> &Announcement
    where
        F: FnOnce(&Participant) -> AckToken,
    {
        let token = ack_builder(&claimant);
        self.push(Announcement {
            claimant,
            code,
            token,
            origin,
            created_at: current_timestamp(),
        })
    }

    fn push(&mut self, announcement: Announcement) -> &Announcement {
        self.records.push_back(announcement);
        while self.records.len() > ANNOUNCEMENT_HISTORY {
            self.records.pop_front();
        }
        // Just pushed, so the deque is non-empty
        &self.records[self.records.len() - 1]
    }

    /// First announcement carrying this token
    pub fn find(&self, token: AckToken) -> Option<&Announcement> {
        self.records.iter().find(|record| record.token == token)
    }

    /// Drop the announcement carrying this token
    pub fn remove(&mut self, token: AckToken) -> Option<Announcement> {
        let index = self.records.iter().position(|record| record.token == token)?;
        self.records.remove(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records, oldest first
    pub fn records(&self) -> impl Iterator<Item = &Announcement> {
        self.records.iter()
    }
}
