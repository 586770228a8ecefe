//! WebSocket handler: identity check before upgrade, then one read loop,
//! one writer task, and one heartbeat watchdog per connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::models::{ServerEvent, UserId};
use crate::services::{CloseReason, LifecycleManager, Session};

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeParams {
    /// Identity token, for clients that cannot set headers on upgrade.
    pub token: Option<String>,
    /// Protocol version.
    pub v: Option<u32>,
}

/// Upgrade HTTP to WebSocket. The identity token comes from the
/// `Authorization` header or the `token` query parameter.
pub async fn ws_handler(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(params): Query<HandshakeParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = bearer
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
        .or(params.token)
        .ok_or_else(|| AppError::Unauthorized("missing identity token".to_string()))?;
    let user_id = state
        .identity()
        .verify(&token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    let version = params.v;
    LifecycleManager::check_protocol(version)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, user_id, version)))
}

async fn handle_socket(state: AppState, socket: WebSocket, user_id: UserId, version: Option<u32>) {
    let (mut sender, mut receiver) = socket.split();

    let Session { handle, mut events } =
        match state.hub().connect(Some(user_id.as_str()), version).await {
            Ok(session) => session,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "handshake failed");
                let event = ServerEvent::error(e.code(), e.to_string());
                if let Ok(text) = serde_json::to_string(&event) {
                    let _ = sender.send(Message::Text(text)).await;
                }
                let _ = sender.close().await;
                return;
            }
        };
    info!(connection_id = %handle.connection_id(), user_id = %user_id, "ws connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to serialize event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });
    let watchdog = state.hub().lifecycle().spawn_watchdog(handle.clone());

    let reason = loop {
        let frame = tokio::select! {
            frame = receiver.next() => frame,
            _ = handle.closed() => break None,
        };
        match frame {
            Some(Ok(Message::Text(text))) => state.hub().handle_text(&handle, &text).await,
            Some(Ok(Message::Ping(_))) => {
                state.hub().lifecycle().heartbeat(&handle).await;
            }
            Some(Ok(Message::Close(_))) | None => break Some(CloseReason::ClientDisconnect),
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(connection_id = %handle.connection_id(), error = %e, "transport error");
                break Some(CloseReason::TransportError);
            }
        }
    };

    if let Some(reason) = reason {
        state.hub().disconnect(&handle, reason).await;
    }
    watchdog.abort();
    send_task.abort();
    info!(connection_id = %handle.connection_id(), "ws disconnected");
}
