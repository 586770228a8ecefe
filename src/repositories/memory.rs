//! Process-local message store for tests and database-less runs.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AppResult;
use crate::models::{Message, NewMessage, PairKey, UserId};

use super::MessageStore;

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    messages: Vec<Message>,
}

/// Keeps every message in insertion order. Lost on restart.
#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: Mutex<MemoryInner>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total messages stored.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: NewMessage) -> AppResult<Message> {
        let pair = message.pair_key();
        let mut inner = self.inner.lock().await;

        let latest = inner
            .messages
            .iter()
            .filter(|m| m.pair_key() == pair)
            .map(|m| m.created_at)
            .max();
        let now = Utc::now();
        let created_at = match latest {
            Some(latest) if latest > now => latest,
            _ => now,
        };

        inner.next_id += 1;
        let stored = Message {
            id: inner.next_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            created_at,
        };
        inner.messages.push(stored.clone());
        debug!(id = stored.id, "message stored in memory");
        Ok(stored)
    }

    async fn between(&self, a: &UserId, b: &UserId) -> AppResult<Vec<Message>> {
        let pair = PairKey::new(a, b);
        let inner = self.inner.lock().await;
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.pair_key() == pair)
            .cloned()
            .collect();
        messages.sort_by_key(Message::order_key);
        Ok(messages)
    }
}
