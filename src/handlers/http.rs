//! HTTP handlers: message history, online users, and health.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::IdentityVerifier;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{Message, OnlineUser};
use crate::services::RealtimeHub;

/// Shared application state for HTTP and WS.
#[derive(Clone)]
pub struct AppState {
    pub hub: RealtimeHub,
    pub identity: IdentityVerifier,
}

impl AppState {
    pub fn new(hub: RealtimeHub, identity: IdentityVerifier) -> Self {
        Self { hub, identity }
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    pub fn identity(&self) -> &IdentityVerifier {
        &self.identity
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub peer_id: String,
}

/// GET /messages?peerId=X: conversation between the caller and X, oldest first.
pub async fn message_history(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let messages = state.hub().router().history(&caller, &query.peer_id).await?;
    Ok(Json(messages))
}

/// GET /users/online: who is connected and what they are playing.
pub async fn online_users(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
) -> Json<Vec<OnlineUser>> {
    Json(state.hub().online_users().await)
}

/// GET /health: liveness probe.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "sonar",
            "connections": state.hub().registry().connection_count().await
        })),
    )
}
