//! Bounded per-connection queue of outbound events.

use tokio::sync::mpsc;
use tracing::warn;

use crate::models::{ConnectionId, ServerEvent};

/// Result of pushing one event to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Buffer full; the event was dropped for this connection only.
    Dropped,
    /// The connection's writer is gone.
    Closed,
}

/// Sending half of a connection's outbound queue. Pushes never wait.
#[derive(Debug, Clone)]
pub struct Outbox {
    connection_id: ConnectionId,
    sender: mpsc::Sender<ServerEvent>,
}

impl Outbox {
    /// Create an outbox and the receiver the socket writer drains.
    pub fn channel(
        connection_id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                connection_id,
                sender,
            },
            receiver,
        )
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn push(&self, event: ServerEvent) -> Delivery {
        match self.sender.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    connection_id = %self.connection_id,
                    event = event.name(),
                    "send buffer full, dropping event"
                );
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    #[tokio::test]
    async fn full_buffer_drops_instead_of_waiting() {
        let (outbox, mut rx) = Outbox::channel(ConnectionId::from("c1"), 1);
        let user = UserId::parse("u1").unwrap();
        assert_eq!(outbox.push(ServerEvent::user_online(user.clone())), Delivery::Delivered);
        assert_eq!(outbox.push(ServerEvent::user_offline(user.clone())), Delivery::Dropped);
        assert_eq!(rx.recv().await, Some(ServerEvent::user_online(user)));
    }

    #[tokio::test]
    async fn closed_receiver_reports_closed() {
        let (outbox, rx) = Outbox::channel(ConnectionId::from("c1"), 4);
        drop(rx);
        let user = UserId::parse("u1").unwrap();
        assert_eq!(outbox.push(ServerEvent::user_online(user)), Delivery::Closed);
    }
}
