//! Integration tests: health, history and presence endpoints over the axum router.
//!
//! Runs against the in-memory message store, so no database is needed.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use sonar::auth::IdentityVerifier;
use sonar::config::{HeartbeatConfig, RealtimeConfig};
use sonar::models::{Message, UserId};
use sonar::repositories::InMemoryMessageStore;
use sonar::{create_app, AppState, RealtimeHub};
use std::sync::Arc;
use tower::util::ServiceExt;

const SECRET: &str = "test-identity-secret";

fn test_state() -> AppState {
    let hub = RealtimeHub::new(
        Arc::new(InMemoryMessageStore::new()),
        HeartbeatConfig::default(),
        RealtimeConfig::default(),
    );
    AppState::new(hub, IdentityVerifier::new(SECRET.to_string()))
}

fn token_for(user: &str) -> String {
    IdentityVerifier::new(SECRET.to_string())
        .issue(&UserId::parse(user).unwrap(), Duration::minutes(5))
        .unwrap()
}

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = create_app(test_state());
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(json.get("connections").and_then(|v| v.as_u64()), Some(0));
}

#[tokio::test]
async fn history_requires_identity() {
    let app = create_app(test_state());
    let req = Request::builder()
        .uri("/messages?peerId=u2")
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/messages?peerId=u2")
        .header("authorization", "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_returns_conversation_in_order() {
    let state = test_state();
    let hub = state.hub().clone();
    let app = create_app(state);

    let a = hub.connect(Some("u1"), None).await.unwrap();
    let b = hub.connect(Some("u2"), None).await.unwrap();
    let router = hub.router();
    router
        .send_message(a.handle.connection_id(), a.handle.user_id(), "u2", "hey")
        .await
        .unwrap();
    router
        .send_message(b.handle.connection_id(), b.handle.user_id(), "u1", "hi there")
        .await
        .unwrap();
    router
        .send_message(a.handle.connection_id(), a.handle.user_id(), "u3", "elsewhere")
        .await
        .unwrap();

    let req = Request::builder()
        .uri("/messages?peerId=u1")
        .header("authorization", format!("Bearer {}", token_for("u2")))
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let messages: Vec<Message> = serde_json::from_slice(&body).unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hey", "hi there"]);
}

#[tokio::test]
async fn history_rejects_blank_peer() {
    let app = create_app(test_state());
    let req = Request::builder()
        .uri("/messages?peerId=%20")
        .header("authorization", format!("Bearer {}", token_for("u1")))
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn online_users_lists_connected_users() {
    let state = test_state();
    let hub = state.hub().clone();
    let app = create_app(state);

    let _a = hub.connect(Some("u1"), None).await.unwrap();
    let _a2 = hub.connect(Some("u1"), None).await.unwrap();
    let _b = hub.connect(Some("u2"), None).await.unwrap();

    let req = Request::builder()
        .uri("/users/online")
        .header("authorization", format!("Bearer {}", token_for("u1")))
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    let users = json.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["userId"], "u1");
    assert_eq!(users[0]["activity"], "Idle");
}

#[tokio::test]
async fn ws_upgrade_requires_identity() {
    let app = create_app(test_state());
    let req = Request::builder()
        .uri("/ws")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_ne!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
}
