//! Network edge: REST endpoints and the WebSocket upgrade.

pub mod http;
pub mod ws;

pub use http::{health, message_history, online_users, AppState, HistoryQuery};
pub use ws::{ws_handler, HandshakeParams};
