//! Connection registry: the single source of truth for who is connected.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::{Connection, ConnectionId, UserId};
use crate::services::outbox::Outbox;

struct Entry {
    connection: Connection,
    outbox: Outbox,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, Entry>,
    /// Never holds an empty set.
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
}

impl RegistryInner {
    fn count_for(&self, user_id: &UserId) -> usize {
        self.by_user.get(user_id).map_or(0, HashSet::len)
    }
}

/// A user's connection count around one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountDelta {
    pub user_id: UserId,
    pub before: usize,
    pub after: usize,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub connection: Connection,
    pub delta: CountDelta,
}

#[derive(Debug, Clone)]
pub enum Removal {
    Removed {
        connection: Connection,
        delta: CountDelta,
    },
    /// Already gone. Not an error.
    NotFound,
}

/// Read access to the registry while a mutation still holds its write lock.
/// Events pushed from here reach every queue in the order the registry
/// changed.
pub struct RegistryView<'a> {
    inner: &'a RegistryInner,
}

impl<'a> RegistryView<'a> {
    /// Every live connection, the one just registered included.
    pub fn recipients(&self) -> impl Iterator<Item = (&'a UserId, &'a Outbox)> + 'a {
        let inner = self.inner;
        inner
            .connections
            .values()
            .map(|entry| (&entry.connection.user_id, &entry.outbox))
    }

    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.inner.by_user.keys().cloned().collect();
        users.sort();
        users
    }
}

/// One fanout target.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub user_id: UserId,
    pub outbox: Outbox,
}

/// Active connections indexed by id and by user. All mutations take one
/// write lock, so count deltas are exact.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. A user may hold any number of connections; only a
    /// reused connection id is rejected. `on_change` runs under the write
    /// lock, after the connection is visible.
    #[instrument(skip(self, outbox, on_change))]
    pub async fn register<F>(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        outbox: Outbox,
        on_change: F,
    ) -> AppResult<Registration>
    where
        F: FnOnce(&CountDelta, &RegistryView<'_>),
    {
        let mut inner = self.inner.write().await;
        if inner.connections.contains_key(&connection_id) {
            return Err(AppError::DuplicateConnection(connection_id.to_string()));
        }

        let before = inner.count_for(&user_id);
        let connection = Connection::new(connection_id.clone(), user_id.clone());
        inner.connections.insert(
            connection_id.clone(),
            Entry {
                connection: connection.clone(),
                outbox,
            },
        );
        inner
            .by_user
            .entry(user_id.clone())
            .or_default()
            .insert(connection_id);
        let after = inner.count_for(&user_id);

        debug!(user_id = %user_id, before, after, "connection registered");
        let delta = CountDelta {
            user_id,
            before,
            after,
        };
        on_change(&delta, &RegistryView { inner: &*inner });
        Ok(Registration { connection, delta })
    }

    /// Remove a connection. Removing twice yields `NotFound` the second time,
    /// and `on_change` only runs for an actual removal.
    #[instrument(skip(self, on_change))]
    pub async fn remove<F>(&self, connection_id: &ConnectionId, on_change: F) -> Removal
    where
        F: FnOnce(&CountDelta, &RegistryView<'_>),
    {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.remove(connection_id) else {
            return Removal::NotFound;
        };

        let user_id = entry.connection.user_id.clone();
        let before = inner.count_for(&user_id);
        if let Some(ids) = inner.by_user.get_mut(&user_id) {
            ids.remove(connection_id);
            if ids.is_empty() {
                inner.by_user.remove(&user_id);
            }
        }
        let after = inner.count_for(&user_id);

        debug!(user_id = %user_id, before, after, "connection removed");
        let delta = CountDelta {
            user_id,
            before,
            after,
        };
        on_change(&delta, &RegistryView { inner: &*inner });
        Removal::Removed {
            connection: entry.connection,
            delta,
        }
    }

    pub async fn connections_for(&self, user_id: &UserId) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .await
            .by_user
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.inner.read().await.by_user.contains_key(user_id)
    }

    /// Users with at least one connection, sorted.
    pub async fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.inner.read().await.by_user.keys().cloned().collect();
        users.sort();
        users
    }

    /// Record a heartbeat. Returns false if the connection is gone.
    pub async fn touch(&self, connection_id: &ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        match inner.connections.get_mut(connection_id) {
            Some(entry) => {
                entry.connection.last_heartbeat_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn connection(&self, connection_id: &ConnectionId) -> Option<Connection> {
        self.inner
            .read()
            .await
            .connections
            .get(connection_id)
            .map(|entry| entry.connection.clone())
    }

    pub async fn outbox(&self, connection_id: &ConnectionId) -> Option<Outbox> {
        self.inner
            .read()
            .await
            .connections
            .get(connection_id)
            .map(|entry| entry.outbox.clone())
    }

    /// Outboxes of every live connection of one user.
    pub async fn outboxes_for(&self, user_id: &UserId) -> Vec<Outbox> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.connections.get(id))
            .map(|entry| entry.outbox.clone())
            .collect()
    }

    /// Every live connection at this instant.
    pub async fn snapshot(&self) -> Vec<Recipient> {
        self.inner
            .read()
            .await
            .connections
            .values()
            .map(|entry| Recipient {
                user_id: entry.connection.user_id.clone(),
                outbox: entry.outbox.clone(),
            })
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn outbox(id: &str) -> Outbox {
        Outbox::channel(ConnectionId::from(id), 8).0
    }

    #[tokio::test]
    async fn multiple_connections_per_user() {
        let registry = ConnectionRegistry::new();
        let first = registry
            .register(uid("u1"), ConnectionId::from("c1"), outbox("c1"), |_, _| {})
            .await
            .unwrap();
        assert_eq!((first.delta.before, first.delta.after), (0, 1));

        let second = registry
            .register(uid("u1"), ConnectionId::from("c2"), outbox("c2"), |_, _| {})
            .await
            .unwrap();
        assert_eq!((second.delta.before, second.delta.after), (1, 2));
        assert_eq!(registry.connections_for(&uid("u1")).await.len(), 2);
        assert_eq!(registry.outboxes_for(&uid("u1")).await.len(), 2);
        assert_eq!(registry.online_users().await, vec![uid("u1")]);
    }

    #[tokio::test]
    async fn duplicate_connection_id_is_rejected() {
        let registry = ConnectionRegistry::new();
        registry
            .register(uid("u1"), ConnectionId::from("c1"), outbox("c1"), |_, _| {})
            .await
            .unwrap();
        let err = registry
            .register(uid("u2"), ConnectionId::from("c1"), outbox("c1"), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateConnection(_)));
        assert!(!registry.is_online(&uid("u2")).await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry
            .register(uid("u1"), ConnectionId::from("c1"), outbox("c1"), |_, _| {})
            .await
            .unwrap();

        match registry.remove(&ConnectionId::from("c1"), |_, _| {}).await {
            Removal::Removed { connection, delta } => {
                assert_eq!(connection.user_id, uid("u1"));
                assert_eq!((delta.before, delta.after), (1, 0));
            }
            Removal::NotFound => panic!("expected removal"),
        }
        let mut called = false;
        assert!(matches!(
            registry.remove(&ConnectionId::from("c1"), |_, _| called = true).await,
            Removal::NotFound
        ));
        assert!(!called);
        assert!(!registry.is_online(&uid("u1")).await);
    }

    #[tokio::test]
    async fn on_change_sees_the_mutated_registry() {
        let registry = ConnectionRegistry::new();
        registry
            .register(uid("w"), ConnectionId::from("w1"), outbox("w1"), |_, _| {})
            .await
            .unwrap();

        let mut seen = Vec::new();
        registry
            .register(uid("u1"), ConnectionId::from("c1"), outbox("c1"), |delta, view| {
                assert_eq!((delta.before, delta.after), (0, 1));
                seen = view.online_users();
                assert_eq!(view.recipients().count(), 2);
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![uid("u1"), uid("w")]);

        registry
            .remove(&ConnectionId::from("c1"), |delta, view| {
                assert_eq!((delta.before, delta.after), (1, 0));
                seen = view.online_users();
                assert!(view.recipients().all(|(user, _)| user != &uid("u1")));
            })
            .await;
        assert_eq!(seen, vec![uid("w")]);
    }

    #[tokio::test]
    async fn touch_updates_heartbeat() {
        let registry = ConnectionRegistry::new();
        let reg = registry
            .register(uid("u1"), ConnectionId::from("c1"), outbox("c1"), |_, _| {})
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(registry.touch(&ConnectionId::from("c1")).await);
        let conn = registry.connection(&ConnectionId::from("c1")).await.unwrap();
        assert!(conn.last_heartbeat_at > reg.connection.last_heartbeat_at);
        assert!(!registry.touch(&ConnectionId::from("missing")).await);
    }

    #[tokio::test]
    async fn online_matches_connections_after_any_sequence() {
        let registry = ConnectionRegistry::new();
        let users = [uid("a"), uid("b"), uid("c")];
        let mut live: Vec<ConnectionId> = Vec::new();
        let mut seed: u64 = 42;

        for step in 0..400 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let pick = (seed >> 33) as usize;
            if pick % 3 != 0 || live.is_empty() {
                let id = ConnectionId::from(format!("c{step}").as_str());
                let user = users[pick % users.len()].clone();
                registry.register(user, id.clone(), outbox("x"), |_, _| {}).await.unwrap();
                live.push(id);
            } else {
                let id = live.swap_remove(pick % live.len());
                assert!(matches!(registry.remove(&id, |_, _| {}).await, Removal::Removed { .. }));
            }

            for user in &users {
                assert_eq!(
                    registry.is_online(user).await,
                    !registry.connections_for(user).await.is_empty()
                );
            }
        }
        assert_eq!(registry.connection_count().await, live.len());
    }
}
