//! Listening activity reported by clients.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::presence::UserId;

/// Activity text for users who are not playing anything.
pub const IDLE: &str = "Idle";

/// Longest accepted activity text, in characters.
pub const MAX_ACTIVITY_LEN: usize = 512;

/// Latest activity of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub user_id: UserId,
    pub activity_text: String,
    pub updated_at: DateTime<Utc>,
}

/// Blank activity means the user stopped playing.
pub fn normalize_activity(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        IDLE
    } else {
        trimmed
    }
}
