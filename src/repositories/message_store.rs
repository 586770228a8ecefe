//! Durable storage collaborator for direct messages.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{Message, NewMessage, UserId};

/// Stores messages and reads conversation history back.
///
/// `insert` assigns `id` and `created_at`. For one conversation pair, the
/// returned `(created_at, id)` must be strictly greater than that of every
/// message already stored for the pair. `between` returns the pair's messages
/// ordered by `(created_at, id)`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: NewMessage) -> AppResult<Message>;

    async fn between(&self, a: &UserId, b: &UserId) -> AppResult<Vec<Message>>;
}

pub type SharedMessageStore = Arc<dyn MessageStore>;
