//! PostgreSQL connection pool for the message store.

use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

pub type DbPool = sqlx::PgPool;

/// Open a pool of at most `max_connections`.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;
    info!(max_connections, "message store pool ready");
    Ok(pool)
}
