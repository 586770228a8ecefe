//! Wires the realtime services together and dispatches client messages.

use tracing::{debug, warn};

use crate::config::{HeartbeatConfig, RealtimeConfig};
use crate::error::AppResult;
use crate::models::{ClientMessage, OnlineUser, ServerEvent};
use crate::repositories::SharedMessageStore;
use crate::services::activity::ActivityStore;
use crate::services::fanout::BroadcastFanout;
use crate::services::lifecycle::{CloseReason, LifecycleManager, Session, SessionHandle};
use crate::services::presence::PresenceTracker;
use crate::services::registry::ConnectionRegistry;
use crate::services::router::MessageRouter;

/// One isolated presence/messaging instance. Cheap to clone.
#[derive(Clone)]
pub struct RealtimeHub {
    registry: ConnectionRegistry,
    presence: PresenceTracker,
    activity: ActivityStore,
    router: MessageRouter,
    lifecycle: LifecycleManager,
}

impl RealtimeHub {
    pub fn new(
        store: SharedMessageStore,
        heartbeat: HeartbeatConfig,
        realtime: RealtimeConfig,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let fanout = BroadcastFanout::new(registry.clone(), realtime.fanout_batch_size);
        let presence = PresenceTracker::new(registry.clone());
        let activity = ActivityStore::new(fanout.clone());
        let router = MessageRouter::new(store, registry.clone(), fanout.clone());
        let lifecycle = LifecycleManager::new(
            registry.clone(),
            fanout,
            activity.clone(),
            heartbeat,
            realtime,
        );
        Self {
            registry,
            presence,
            activity,
            router,
            lifecycle,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn activity(&self) -> &ActivityStore {
        &self.activity
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub async fn connect(
        &self,
        identity: Option<&str>,
        protocol_version: Option<u32>,
    ) -> AppResult<Session> {
        self.lifecycle.handshake(identity, protocol_version).await
    }

    pub async fn disconnect(&self, handle: &SessionHandle, reason: CloseReason) -> bool {
        self.lifecycle.close(handle, reason).await
    }

    /// Handle one text frame. Failures are reported to this connection only.
    pub async fn handle_text(&self, handle: &SessionHandle, text: &str) {
        let result = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.dispatch(handle, message).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            debug!(connection_id = %handle.connection_id(), error = %e, "client message rejected");
            self.report_error(handle, ServerEvent::error(e.code(), e.to_string()))
                .await;
        }
    }

    pub async fn dispatch(&self, handle: &SessionHandle, message: ClientMessage) -> AppResult<()> {
        match message {
            ClientMessage::SendMessage { data } => {
                self.router
                    .send_message(
                        handle.connection_id(),
                        handle.user_id(),
                        &data.receiver_id,
                        &data.content,
                    )
                    .await?;
            }
            ClientMessage::UpdateActivity { data } => {
                self.activity
                    .set_activity_now(handle.user_id(), &data.text)
                    .await?;
            }
            ClientMessage::Heartbeat => {
                self.lifecycle.heartbeat(handle).await;
            }
        }
        Ok(())
    }

    async fn report_error(&self, handle: &SessionHandle, event: ServerEvent) {
        match self.registry.outbox(handle.connection_id()).await {
            Some(outbox) => {
                outbox.push(event);
            }
            None => warn!(connection_id = %handle.connection_id(), "error for closed connection dropped"),
        }
    }

    /// Online users with their current activity.
    pub async fn online_users(&self) -> Vec<OnlineUser> {
        let mut users = Vec::new();
        for user_id in self.presence.online_users().await {
            let activity = self.activity.get_activity(&user_id).await;
            users.push(OnlineUser { user_id, activity });
        }
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;
    use std::sync::Arc;
    use crate::repositories::InMemoryMessageStore;

    fn hub() -> RealtimeHub {
        RealtimeHub::new(
            Arc::new(InMemoryMessageStore::new()),
            HeartbeatConfig::default(),
            RealtimeConfig::default(),
        )
    }

    #[tokio::test]
    async fn malformed_frame_reports_error_and_keeps_connection() {
        let hub = hub();
        let mut session = hub.connect(Some("u1"), None).await.unwrap();

        hub.handle_text(&session.handle, "{not json").await;
        match session.events.recv().await {
            Some(ServerEvent::Error(payload)) => assert_eq!(payload.code, "invalid_message"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(hub.registry().is_online(&UserId::parse("u1").unwrap()).await);
    }

    #[tokio::test]
    async fn empty_message_reports_invalid_message() {
        let hub = hub();
        let mut session = hub.connect(Some("u1"), None).await.unwrap();

        hub.handle_text(
            &session.handle,
            r#"{"event":"send_message","data":{"receiverId":"u2","content":"  "}}"#,
        )
        .await;
        match session.events.recv().await {
            Some(ServerEvent::Error(payload)) => assert_eq!(payload.code, "invalid_message"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn online_users_include_activity() {
        let hub = hub();
        let session = hub.connect(Some("u1"), None).await.unwrap();
        hub.handle_text(
            &session.handle,
            r#"{"event":"update_activity","data":{"text":"Playing Yellow by Coldplay"}}"#,
        )
        .await;

        let online = hub.online_users().await;
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].user_id.as_str(), "u1");
        assert_eq!(online[0].activity, "Playing Yellow by Coldplay");
    }
}
