//! Message persistence: the store interface and its Postgres and in-memory backends.

mod memory;
mod message_store;
mod postgres;

pub use memory::InMemoryMessageStore;
pub use message_store::{MessageStore, SharedMessageStore};
pub use postgres::PgMessageStore;
