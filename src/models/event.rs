//! Websocket wire events in both directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::presence::UserId;

/// Event sent over WebSocket to clients: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    UserOnline(UserRef),
    UserOffline(UserRef),
    ActivityChanged(ActivityPayload),
    MessageReceived(Message),
    MessageAck(AckPayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn user_online(user_id: UserId) -> Self {
        ServerEvent::UserOnline(UserRef { user_id })
    }

    pub fn user_offline(user_id: UserId) -> Self {
        ServerEvent::UserOffline(UserRef { user_id })
    }

    pub fn activity_changed(user_id: UserId, text: impl Into<String>) -> Self {
        ServerEvent::ActivityChanged(ActivityPayload {
            user_id,
            text: text.into(),
        })
    }

    pub fn ack(message: &Message) -> Self {
        ServerEvent::MessageAck(AckPayload {
            id: message.id,
            created_at: message.created_at,
        })
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            code: code.into(),
            message: message.into(),
        })
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserOnline(_) => "user_online",
            ServerEvent::UserOffline(_) => "user_offline",
            ServerEvent::ActivityChanged(_) => "activity_changed",
            ServerEvent::MessageReceived(_) => "message_received",
            ServerEvent::MessageAck(_) => "message_ack",
            ServerEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    pub user_id: UserId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// WebSocket client message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    SendMessage { data: SendMessagePayload },
    UpdateActivity { data: UpdateActivityPayload },
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub receiver_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateActivityPayload {
    pub text: String,
}
