//! Middleware: identity extraction for the REST endpoints. The websocket
//! handshake verifies its token in the ws handler, before upgrade.

pub mod auth;

pub use auth::AuthUser;
