//! Direct messages and conversation pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::presence::UserId;

/// Longest accepted message body, in characters.
pub const MAX_CONTENT_LEN: usize = 4000;

/// A persisted direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Ordering key within a conversation.
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.sender_id, &self.receiver_id)
    }
}

/// Unordered pair of users, stored lowest id first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    low: UserId,
    high: UserId,
}

impl PairKey {
    pub fn new(a: &UserId, b: &UserId) -> Self {
        if a <= b {
            Self { low: a.clone(), high: b.clone() }
        } else {
            Self { low: b.clone(), high: a.clone() }
        }
    }

    /// Column value for the pair. User ids never contain control characters,
    /// so the unit separator cannot collide.
    pub fn storage_key(&self) -> String {
        format!("{}\u{1f}{}", self.low, self.high)
    }
}

/// Unvalidated message as received from a client.
#[derive(Debug, Clone, Validate)]
pub struct MessageDraft {
    pub sender_id: UserId,
    #[validate(length(min = 1, max = 255))]
    pub receiver_id: String,
    /// Length is checked after trimming, in `into_new_message`.
    pub content: String,
}

/// Message that passed validation and is ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
}

impl NewMessage {
    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.sender_id, &self.receiver_id)
    }
}

impl MessageDraft {
    pub fn new(sender_id: UserId, receiver_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id: receiver_id.into(),
            content: content.into(),
        }
    }

    /// Validate and normalize. Content is stored trimmed.
    pub fn into_new_message(self) -> AppResult<NewMessage> {
        self.validate()
            .map_err(|e| AppError::InvalidMessage(e.to_string()))?;
        let content = self.content.trim();
        if content.is_empty() {
            return Err(AppError::InvalidMessage("message content is empty".to_string()));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::InvalidMessage(format!(
                "message content exceeds {MAX_CONTENT_LEN} characters"
            )));
        }
        let receiver_id = UserId::parse(&self.receiver_id)?;
        if receiver_id == self.sender_id {
            return Err(AppError::InvalidMessage(
                "cannot send a message to yourself".to_string(),
            ));
        }
        Ok(NewMessage {
            sender_id: self.sender_id,
            receiver_id,
            content: content.to_string(),
        })
    }
}
