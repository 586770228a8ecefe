//! Realtime core: connection registry, presence, activity, fanout, routing, and lifecycle.

pub mod activity;
pub mod fanout;
pub mod hub;
pub mod lifecycle;
pub mod outbox;
pub mod presence;
pub mod registry;
pub mod router;

pub use activity::ActivityStore;
pub use fanout::{BroadcastFanout, FanoutReport};
pub use hub::RealtimeHub;
pub use lifecycle::{CloseReason, ConnectionState, LifecycleManager, Session, SessionHandle};
pub use outbox::{Delivery, Outbox};
pub use presence::{PresenceTracker, PresenceTransition};
pub use registry::{ConnectionRegistry, CountDelta, Registration, RegistryView, Removal};
pub use router::MessageRouter;
