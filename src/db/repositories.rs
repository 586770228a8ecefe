//! Direct message queries.

use crate::error::AppResult;
use crate::models::{Message, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::DbPool;

/// Create the messages table and its pair index if they do not exist yet.
pub async fn schema_ensure(pool: &DbPool) -> AppResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS direct_messages (
            id          BIGSERIAL PRIMARY KEY,
            pair_key    TEXT NOT NULL,
            sender_id   TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS direct_messages_pair_idx ON direct_messages (pair_key, created_at, id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

// ---- Messages ----

#[derive(Debug, FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            sender_id: UserId::from_stored(row.sender_id),
            receiver_id: UserId::from_stored(row.receiver_id),
            content: row.content,
            created_at: row.created_at,
        }
    }
}

/// Insert a message. `created_at` never goes below the pair's latest message,
/// so a clock step backwards cannot reorder a conversation.
pub async fn message_insert(
    pool: &DbPool,
    pair_key: &str,
    sender_id: &str,
    receiver_id: &str,
    content: &str,
) -> AppResult<MessageRow> {
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO direct_messages (pair_key, sender_id, receiver_id, content, created_at)
        VALUES (
            $1, $2, $3, $4,
            GREATEST(
                clock_timestamp(),
                COALESCE(
                    (SELECT MAX(created_at) FROM direct_messages WHERE pair_key = $1),
                    '-infinity'::timestamptz
                )
            )
        )
        RETURNING id, sender_id, receiver_id, content, created_at
        "#,
    )
    .bind(pair_key)
    .bind(sender_id)
    .bind(receiver_id)
    .bind(content)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn messages_by_pair(pool: &DbPool, pair_key: &str) -> AppResult<Vec<MessageRow>> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, sender_id, receiver_id, content, created_at
        FROM direct_messages
        WHERE pair_key = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(pair_key)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
