//! Message router: validate, persist, then deliver direct messages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::models::{ConnectionId, Message, MessageDraft, PairKey, ServerEvent, UserId};
use crate::repositories::SharedMessageStore;
use crate::services::fanout::BroadcastFanout;
use crate::services::outbox::Delivery;
use crate::services::registry::ConnectionRegistry;

type PairLock = Arc<tokio::sync::Mutex<()>>;

/// Routes direct messages. Nothing is delivered or acknowledged unless the
/// store accepted it first.
#[derive(Clone)]
pub struct MessageRouter {
    store: SharedMessageStore,
    registry: ConnectionRegistry,
    fanout: BroadcastFanout,
    /// Serializes persistence per conversation so stored order equals
    /// completion order.
    pair_locks: Arc<Mutex<HashMap<PairKey, PairLock>>>,
}

impl MessageRouter {
    pub fn new(
        store: SharedMessageStore,
        registry: ConnectionRegistry,
        fanout: BroadcastFanout,
    ) -> Self {
        Self {
            store,
            registry,
            fanout,
            pair_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn pair_lock(&self, pair: PairKey) -> PairLock {
        let mut locks = self
            .pair_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(pair).or_default().clone()
    }

    /// Persist a message, push it to the receiver's live connections, and ack
    /// the originating connection. Returns the stored message.
    #[instrument(skip(self, content), fields(sender = %sender_id))]
    pub async fn send_message(
        &self,
        origin: &ConnectionId,
        sender_id: &UserId,
        receiver_id: &str,
        content: &str,
    ) -> AppResult<Message> {
        let new_message =
            MessageDraft::new(sender_id.clone(), receiver_id, content).into_new_message()?;

        let stored = {
            let lock = self.pair_lock(new_message.pair_key());
            let _guard = lock.lock().await;
            self.store.insert(new_message).await.map_err(|e| {
                warn!(error = %e, "message persistence failed");
                AppError::Persistence(e.to_string())
            })?
        };

        let receivers = self.registry.outboxes_for(&stored.receiver_id).await;
        if receivers.is_empty() {
            debug!(id = stored.id, receiver = %stored.receiver_id, "receiver offline, message kept for history");
        } else {
            let report = self
                .fanout
                .deliver(&ServerEvent::MessageReceived(stored.clone()), &receivers);
            if report.dropped > 0 || report.closed > 0 {
                warn!(
                    id = stored.id,
                    dropped = report.dropped,
                    closed = report.closed,
                    "message delivery is best effort; receiver will see it in history"
                );
            }
        }

        match self.registry.outbox(origin).await {
            Some(outbox) => {
                if outbox.push(ServerEvent::ack(&stored)) != Delivery::Delivered {
                    warn!(id = stored.id, connection_id = %origin, "ack not delivered");
                }
            }
            None => debug!(id = stored.id, connection_id = %origin, "origin closed before ack"),
        }

        info!(id = stored.id, receiver = %stored.receiver_id, "message sent");
        Ok(stored)
    }

    /// Conversation between `caller` and `peer`, oldest first.
    pub async fn history(&self, caller: &UserId, peer: &str) -> AppResult<Vec<Message>> {
        let peer = UserId::parse(peer)?;
        self.store.between(caller, &peer).await
    }
}
