//! Presence: online/offline transitions derived from registry deltas.

use crate::models::{ServerEvent, UserId};
use crate::services::registry::{ConnectionRegistry, CountDelta};

/// A user crossed the 0/1 connection boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceTransition {
    Online(UserId),
    Offline(UserId),
}

impl PresenceTransition {
    pub fn user_id(&self) -> &UserId {
        match self {
            PresenceTransition::Online(user) | PresenceTransition::Offline(user) => user,
        }
    }

    pub fn into_event(self) -> ServerEvent {
        match self {
            PresenceTransition::Online(user) => ServerEvent::user_online(user),
            PresenceTransition::Offline(user) => ServerEvent::user_offline(user),
        }
    }
}

/// Reads presence off the registry. Keeps no state of its own.
#[derive(Clone)]
pub struct PresenceTracker {
    registry: ConnectionRegistry,
}

impl PresenceTracker {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// 0→1 is `Online`, 1→0 is `Offline`; other deltas are not transitions.
    pub fn transition(delta: &CountDelta) -> Option<PresenceTransition> {
        match (delta.before, delta.after) {
            (0, 1) => Some(PresenceTransition::Online(delta.user_id.clone())),
            (1, 0) => Some(PresenceTransition::Offline(delta.user_id.clone())),
            _ => None,
        }
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.registry.is_online(user_id).await
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.registry.online_users().await
    }
}
