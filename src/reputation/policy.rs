//! Reputation thresholds and the periodic decay policy

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// What to do with a participant whose score crossed the warning line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Score is above the warning line
    Clear,
    /// Remove from the roster and forget the score
    Evict,
    /// Numbered warning for a waiting participant
    Warn { count: i32 },
    /// The head is never evicted; they get asked whether they need help
    NeedHelp,
    /// Not in the roster any more; just forget the score
    Purge,
}

/// Per-tick score tax applied to every tracked participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayPolicy {
    /// Points taken by the penalty step
    pub penalty: i32,
    /// Points handed back afterwards if the participant is still tracked
    pub recovery: i32,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            penalty: 1,
            recovery: 0,
        }
    }
}

impl DecayPolicy {
    /// Net points lost per tick
    pub fn net_tax(&self) -> i32 {
        self.penalty - self.recovery
    }
}

/// Score steps and thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationPolicy {
    /// Points for a confirmed acknowledgement
    pub award_points: i32,
    /// Points for a confirmed acknowledgement when below `rehabilitation_below`
    pub rehabilitation_points: i32,
    /// Scores strictly below this get `rehabilitation_points` instead
    pub rehabilitation_below: i32,
    /// Scores at or below this are evaluated
    pub warn_at: i32,
    /// Scores at or below this evict a waiting participant
    pub evict_at: i32,
    pub decay: DecayPolicy,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            award_points: 2,
            rehabilitation_points: 3,
            rehabilitation_below: -3,
            warn_at: -2,
            evict_at: -4,
            decay: DecayPolicy::default(),
        }
    }
}

impl ReputationPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.award_points <= 0 || self.rehabilitation_points <= 0 {
            return Err(anyhow!("Award points must be positive"));
        }
        if self.evict_at > self.warn_at {
            return Err(anyhow!(
                "Eviction threshold ({}) must not be above the warning threshold ({})",
                self.evict_at,
                self.warn_at
            ));
        }
        if self.decay.penalty <= 0 {
            return Err(anyhow!("Decay penalty must be positive"));
        }
        if self.decay.recovery < 0 || self.decay.net_tax() <= 0 {
            return Err(anyhow!(
                "Decay recovery ({}) must be non-negative and below the penalty ({})",
                self.decay.recovery,
                self.decay.penalty
            ));
        }
        Ok(())
    }

    /// Points a confirmed acknowledgement adds to `score`
    pub fn award_for(&self, score: i32) -> i32 {
        if score < self.rehabilitation_below {
            self.rehabilitation_points
        } else {
            self.award_points
        }
    }

    /// Whether a freshly penalized score needs evaluating
    pub fn needs_evaluation(&self, score: i32) -> bool {
        score <= self.warn_at
    }

    /// Decide what a score means for a participant in the given roster position
    pub fn verdict(&self, score: i32, in_roster: bool, is_head: bool) -> Verdict {
        if !self.needs_evaluation(score) {
            return Verdict::Clear;
        }

        match (in_roster, is_head) {
            (true, false) if score <= self.evict_at => Verdict::Evict,
            (true, true) => Verdict::NeedHelp,
            (true, false) => Verdict::Warn {
                count: self.warn_at - score,
            },
            (false, _) => Verdict::Purge,
        }
    }
}
