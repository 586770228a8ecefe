//! Entry point: load config, wire dependencies, and run the server.

use sonar::auth::IdentityVerifier;
use sonar::config::Config;
use sonar::repositories::{InMemoryMessageStore, PgMessageStore, SharedMessageStore};
use sonar::{create_app, AppState, RealtimeHub};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: SharedMessageStore = match &config.database_url {
        Some(url) => Arc::new(PgMessageStore::connect(url, config.database_max_connections).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, messages are kept in memory only");
            Arc::new(InMemoryMessageStore::new())
        }
    };

    let hub = RealtimeHub::new(store, config.heartbeat, config.realtime);
    let identity = IdentityVerifier::new(config.identity_secret.clone());
    let state = AppState::new(hub, identity);

    let app = create_app(state).layer(CorsLayer::permissive());

    tracing::info!(
        addr = %config.server_addr,
        heartbeat_secs = config.heartbeat.interval.as_secs(),
        "listening"
    );
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
