//! Utility functions for the queue service

use crate::types::AckToken;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Length of a claim code
pub const CLAIM_CODE_LENGTH: usize = 5;

/// Characters never used in claim codes (easily confused with 1, 0 and 2)
pub const AMBIGUOUS_CODE_CHARS: [char; 6] = ['I', 'O', 'Z', 'i', 'o', 'z'];

/// Generate a new acknowledgement token
pub fn generate_ack_token() -> AckToken {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Check that a claim code is exactly five ASCII alphanumerics with none of
/// the ambiguous characters
pub fn is_valid_claim_code(code: &str) -> bool {
    code.chars().count() == CLAIM_CODE_LENGTH
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() && !AMBIGUOUS_CODE_CHARS.contains(&c))
}
