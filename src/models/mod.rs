//! Data models for connections, activity, messages, and wire events.

pub mod activity;
pub mod event;
pub mod message;
pub mod presence;

pub use activity::*;
pub use event::*;
pub use message::*;
pub use presence::*;
