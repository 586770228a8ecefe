//! Connection lifecycle: handshake, heartbeats, and exactly-once cleanup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::{HeartbeatConfig, RealtimeConfig};
use crate::error::{AppError, AppResult};
use crate::models::{ActivityRecord, Connection, ConnectionId, ServerEvent, UserId};
use crate::services::activity::ActivityStore;
use crate::services::fanout::BroadcastFanout;
use crate::services::outbox::Outbox;
use crate::services::presence::PresenceTracker;
use crate::services::registry::{ConnectionRegistry, RegistryView, Removal};

/// Only wire protocol version this server speaks.
pub const SUPPORTED_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    /// Terminal.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnect,
    TransportError,
    HeartbeatTimeout,
}

/// Shared view of one connection's lifecycle, held by its socket task and
/// its heartbeat watchdog.
#[derive(Debug)]
pub struct SessionHandle {
    connection: Connection,
    state: watch::Sender<ConnectionState>,
}

impl SessionHandle {
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection.connection_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.connection.user_id
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Resolves once the connection reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    /// Moves to `Closed`. Only the first caller gets `true`.
    fn begin_close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        })
    }
}

/// A freshly activated connection: its lifecycle handle and the queue its
/// socket writer drains.
#[derive(Debug)]
pub struct Session {
    pub handle: Arc<SessionHandle>,
    pub events: mpsc::Receiver<ServerEvent>,
}

#[derive(Clone)]
pub struct LifecycleManager {
    registry: ConnectionRegistry,
    fanout: BroadcastFanout,
    activity: ActivityStore,
    heartbeat: HeartbeatConfig,
    outbound_buffer_size: usize,
}

impl LifecycleManager {
    pub fn new(
        registry: ConnectionRegistry,
        fanout: BroadcastFanout,
        activity: ActivityStore,
        heartbeat: HeartbeatConfig,
        realtime: RealtimeConfig,
    ) -> Self {
        Self {
            registry,
            fanout,
            activity,
            heartbeat,
            outbound_buffer_size: realtime.outbound_buffer_size,
        }
    }

    /// Reject versions other than [`SUPPORTED_PROTOCOL_VERSION`]. Absent means current.
    pub fn check_protocol(protocol_version: Option<u32>) -> AppResult<u32> {
        let version = protocol_version.unwrap_or(SUPPORTED_PROTOCOL_VERSION);
        if version != SUPPORTED_PROTOCOL_VERSION {
            return Err(AppError::UnsupportedProtocol(version));
        }
        Ok(version)
    }

    /// Bind an already-verified identity to a new connection and activate it.
    ///
    /// The new connection first receives `user_online` and `activity_changed`
    /// for every other online user; everyone else hears `user_online` if this
    /// is the user's first connection.
    pub async fn handshake(
        &self,
        identity: Option<&str>,
        protocol_version: Option<u32>,
    ) -> AppResult<Session> {
        let identity = identity
            .filter(|raw| !raw.trim().is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing identity".to_string()))?;
        let user_id = UserId::parse(identity)
            .map_err(|_| AppError::Unauthorized("malformed identity".to_string()))?;
        Self::check_protocol(protocol_version)?;

        let (state, _) = watch::channel(ConnectionState::Connecting);
        let connection_id = ConnectionId::generate();
        let (outbox, events) = Outbox::channel(connection_id.clone(), self.outbound_buffer_size);

        // Lock order is activity records, then registry. The records guard
        // keeps the initial sync consistent with later activity broadcasts.
        let activity = self.activity.records().await;
        let fanout = &self.fanout;
        let registration = self
            .registry
            .register(user_id.clone(), connection_id, outbox.clone(), |delta, view| {
                initial_sync(&outbox, &delta.user_id, view, &activity);
                if let Some(transition) = PresenceTracker::transition(delta) {
                    fanout.deliver_except(&transition.into_event(), view.recipients(), &delta.user_id);
                }
            })
            .await?;
        drop(activity);
        state.send_replace(ConnectionState::Active);
        let handle = Arc::new(SessionHandle {
            connection: registration.connection,
            state,
        });

        info!(
            connection_id = %handle.connection_id(),
            user_id = %user_id,
            connections = registration.delta.after,
            "connection active"
        );
        Ok(Session { handle, events })
    }

    /// Record a heartbeat. Returns false once the connection is gone.
    pub async fn heartbeat(&self, handle: &SessionHandle) -> bool {
        if handle.state() != ConnectionState::Active {
            return false;
        }
        self.registry.touch(handle.connection_id()).await
    }

    /// Close a connection. Safe to call from racing close paths: only the
    /// first call removes it from the registry and fans out `user_offline`.
    pub async fn close(&self, handle: &SessionHandle, reason: CloseReason) -> bool {
        if !handle.begin_close() {
            debug!(connection_id = %handle.connection_id(), ?reason, "already closed");
            return false;
        }

        let fanout = &self.fanout;
        let removal = self
            .registry
            .remove(handle.connection_id(), |delta, view| {
                if let Some(transition) = PresenceTracker::transition(delta) {
                    fanout.deliver_except(&transition.into_event(), view.recipients(), &delta.user_id);
                }
            })
            .await;
        if let Removal::NotFound = removal {
            debug!(connection_id = %handle.connection_id(), "connection already removed");
        }

        info!(
            connection_id = %handle.connection_id(),
            user_id = %handle.user_id(),
            ?reason,
            "connection closed"
        );
        true
    }

    /// Close the connection when no heartbeat arrives within
    /// `interval × multiplier`. Ends when the connection closes.
    pub fn spawn_watchdog(&self, handle: Arc<SessionHandle>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move { manager.watch_heartbeats(handle).await })
    }

    async fn watch_heartbeats(&self, handle: Arc<SessionHandle>) {
        let timeout = self.heartbeat.timeout();
        let mut interval = time::interval(self.heartbeat.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = handle.closed() => break,
            }

            let Some(connection) = self.registry.connection(handle.connection_id()).await else {
                break;
            };
            let silent = Utc::now() - connection.last_heartbeat_at;
            if silent.to_std().map_or(false, |silent| silent > timeout) {
                warn!(
                    connection_id = %handle.connection_id(),
                    silent_ms = silent.num_milliseconds(),
                    "heartbeat timeout"
                );
                self.close(&handle, CloseReason::HeartbeatTimeout).await;
                break;
            }
        }

        debug!(connection_id = %handle.connection_id(), "heartbeat watchdog ended");
    }
}

/// Tell a new connection who else is online and what they are playing.
fn initial_sync(
    outbox: &Outbox,
    user_id: &UserId,
    view: &RegistryView<'_>,
    activity: &HashMap<UserId, ActivityRecord>,
) {
    for other in view.online_users() {
        if &other == user_id {
            continue;
        }
        outbox.push(ServerEvent::user_online(other.clone()));
        if let Some(record) = activity.get(&other) {
            outbox.push(ServerEvent::activity_changed(other, record.activity_text.clone()));
        }
    }
}
