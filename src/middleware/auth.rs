//! Auth extractor: caller identity from a Bearer token.

use axum::http::header::AUTHORIZATION;
use tracing::debug;

use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::models::UserId;

const BEARER_PREFIX: &str = "Bearer ";

/// Extractor: verified user id from the identity provider's token.
#[derive(Clone, Debug)]
pub struct AuthUser(pub UserId);

#[axum::async_trait]
impl axum::extract::FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix(BEARER_PREFIX));
        let token = auth.ok_or_else(|| {
            debug!("rejected request: missing bearer token");
            AppError::Unauthorized("Missing or invalid Authorization header".to_string())
        })?;
        let user_id = state.identity().verify(token)?;
        Ok(AuthUser(user_id))
    }
}
