//! Broadcast fanout over the registry's connection snapshot.

use tracing::{debug, info};

use crate::models::{ServerEvent, UserId};
use crate::services::outbox::{Delivery, Outbox};
use crate::services::registry::ConnectionRegistry;

/// Counts from one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

impl FanoutReport {
    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Dropped => self.dropped += 1,
            Delivery::Closed => self.closed += 1,
        }
    }
}

/// Pushes presence and activity events to every live connection. One slow
/// or dead connection never holds up the others.
#[derive(Clone)]
pub struct BroadcastFanout {
    registry: ConnectionRegistry,
    batch_size: usize,
}

impl BroadcastFanout {
    pub fn new(registry: ConnectionRegistry, batch_size: usize) -> Self {
        Self {
            registry,
            batch_size: batch_size.max(1),
        }
    }

    /// Deliver to every connection registered at the time of the call,
    /// yielding between batches. Callers that need per-queue ordering across
    /// concurrent broadcasts hold their own lock around this.
    pub async fn broadcast(&self, event: ServerEvent) -> FanoutReport {
        let recipients: Vec<Outbox> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|r| r.outbox)
            .collect();

        let mut report = FanoutReport::default();
        for (index, batch) in recipients.chunks(self.batch_size).enumerate() {
            if index > 0 {
                tokio::task::yield_now().await;
            }
            for outbox in batch {
                let delivery = outbox.push(event.clone());
                if delivery == Delivery::Closed {
                    debug!(connection_id = %outbox.connection_id(), "skipping closed connection");
                }
                report.record(delivery);
            }
        }

        info!(
            event = event.name(),
            delivered = report.delivered,
            dropped = report.dropped,
            closed = report.closed,
            "broadcast"
        );
        report
    }

    /// Deliver to an explicit set of outboxes.
    pub fn deliver(&self, event: &ServerEvent, outboxes: &[Outbox]) -> FanoutReport {
        let mut report = FanoutReport::default();
        for outbox in outboxes {
            report.record(outbox.push(event.clone()));
        }
        report
    }

    /// Deliver to every recipient except `skip_user`'s own connections in one
    /// pass with no suspension point. Presence changes go through here while
    /// the registry write lock is still held.
    pub fn deliver_except<'a, I>(
        &self,
        event: &ServerEvent,
        recipients: I,
        skip_user: &UserId,
    ) -> FanoutReport
    where
        I: IntoIterator<Item = (&'a UserId, &'a Outbox)>,
    {
        let mut report = FanoutReport::default();
        for (user_id, outbox) in recipients {
            if user_id != skip_user {
                report.record(outbox.push(event.clone()));
            }
        }
        info!(
            event = event.name(),
            delivered = report.delivered,
            dropped = report.dropped,
            closed = report.closed,
            "presence fanout"
        );
        report
    }
}
