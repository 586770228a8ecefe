//! Identities and live connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const MAX_USER_ID_LEN: usize = 255;

/// Opaque user identity issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Accepts any non-blank identity of at most 255 bytes without control characters.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidMessage("user id must not be empty".to_string()));
        }
        if trimmed.len() > MAX_USER_ID_LEN {
            return Err(AppError::InvalidMessage("user id is too long".to_string()));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(AppError::InvalidMessage(
                "user id contains control characters".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Wrap an id read back from the message store, where it was validated on write.
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique id of one socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a unique connection id (`<pid>.<uuid>`).
    pub fn generate() -> Self {
        Self(format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered connection as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(connection_id: ConnectionId, user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            user_id,
            connected_at: now,
            last_heartbeat_at: now,
        }
    }
}

/// Online user with the activity last reported for them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: UserId,
    pub activity: String,
}
