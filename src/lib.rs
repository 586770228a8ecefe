//! Realtime presence, listening-activity broadcast and direct messaging.
//!
//! Tracks who is connected over WebSocket, fans out online/offline and
//! "now playing" changes, and persists then delivers one-to-one messages in
//! per-conversation order.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use services::RealtimeHub;

use axum::routing::get;
use handlers::http;
use tower_http::trace::TraceLayer;

/// Build the API router (ws, history, presence, health). Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/messages", get(http::message_history))
        .route("/users/online", get(http::online_users))
        .route("/health", get(http::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
