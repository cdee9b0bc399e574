//! Reputation tracking for queue participants
//!
//! Confirmed acknowledgements earn points, inactivity costs points on every
//! decay tick, and low scores lead to warnings and eventually eviction.

pub mod ledger;
pub mod policy;

pub use ledger::{ReputationLedger, ScoreEntry};
pub use policy::{DecayPolicy, ReputationPolicy, Verdict};
