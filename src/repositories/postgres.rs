//! Postgres-backed message store.

use async_trait::async_trait;
use tracing::instrument;

use crate::db::{self, DbPool};
use crate::error::AppResult;
use crate::models::{Message, NewMessage, PairKey, UserId};

use super::MessageStore;

#[derive(Clone)]
pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = db::create_pool(database_url, max_connections).await?;
        db::schema_ensure(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    #[instrument(skip(self, message), fields(sender = %message.sender_id, receiver = %message.receiver_id))]
    async fn insert(&self, message: NewMessage) -> AppResult<Message> {
        let pair = message.pair_key();
        let row = db::message_insert(
            &self.pool,
            &pair.storage_key(),
            message.sender_id.as_str(),
            message.receiver_id.as_str(),
            &message.content,
        )
        .await?;
        Ok(row.into())
    }

    async fn between(&self, a: &UserId, b: &UserId) -> AppResult<Vec<Message>> {
        let pair = PairKey::new(a, b);
        let rows = db::messages_by_pair(&self.pool, &pair.storage_key()).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn round_trips_history_in_order() {
        let database_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(u) => u,
            Err(_) => {
                eprintln!("Skip postgres store test: set TEST_DATABASE_URL");
                return;
            }
        };
        let store = PgMessageStore::connect(&database_url, 2).await.unwrap();
        let suffix = uuid::Uuid::new_v4().as_simple().to_string();
        let a = uid(&format!("a-{suffix}"));
        let b = uid(&format!("b-{suffix}"));

        for (from, to, content) in [(&a, &b, "one"), (&b, &a, "two"), (&a, &b, "three")] {
            store
                .insert(NewMessage {
                    sender_id: from.clone(),
                    receiver_id: to.clone(),
                    content: content.to_string(),
                })
                .await
                .unwrap();
        }

        let history = store.between(&b, &a).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        for pair in history.windows(2) {
            assert!(pair[0].order_key() < pair[1].order_key());
        }
    }
}
