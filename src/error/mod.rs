//! Application error types shared by the realtime core and the HTTP edge.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Handshake carried no usable identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocol(u32),

    /// Bad payload from a client. The connection stays open.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The message store failed; nothing was delivered. Safe to retry.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Connection not found: {0}")]
    NotFound(String),

    #[error("Connection already registered: {0}")]
    DuplicateConnection(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable code sent in websocket `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Db(_) => "database_error",
            AppError::Serialization(_) | AppError::InvalidMessage(_) => "invalid_message",
            AppError::Unauthorized(_) | AppError::Jwt(_) => "unauthorized",
            AppError::UnsupportedProtocol(_) => "unsupported_protocol",
            AppError::Persistence(_) => "persistence_error",
            AppError::NotFound(_) => "not_found",
            AppError::DuplicateConnection(_) => "duplicate_connection",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether the client may resend the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Persistence(_) | AppError::Db(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Db(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
            ),
            AppError::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid payload: {}", e),
            ),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::UnsupportedProtocol(v) => (
                StatusCode::BAD_REQUEST,
                format!("Unsupported protocol version {}", v),
            ),
            AppError::InvalidMessage(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Persistence(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::DuplicateConnection(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Jwt(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", e),
            ),
        };

        let body = Json(json!({ "error": message, "code": self.code() }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
