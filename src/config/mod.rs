//! Application configuration loaded from environment.

use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g. `0.0.0.0:3000`).
    pub server_addr: SocketAddr,
    /// PostgreSQL connection URL. When unset, messages are kept in memory.
    pub database_url: Option<String>,
    /// Upper bound on pooled PostgreSQL connections.
    pub database_max_connections: u32,
    /// HS256 secret shared with the identity provider that signs user tokens.
    pub identity_secret: String,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
    /// Heartbeat timing for live connections.
    pub heartbeat: HeartbeatConfig,
    /// Fanout and per-connection buffering.
    pub realtime: RealtimeConfig,
}

/// Longest accepted heartbeat interval (one day).
pub const MAX_HEARTBEAT_INTERVAL_SECS: u64 = 86_400;

/// How often clients are expected to heartbeat and how many missed
/// intervals are tolerated before the connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout_multiplier: u32,
}

impl HeartbeatConfig {
    /// Silence longer than this closes the connection. `None` on overflow.
    pub fn checked_timeout(&self) -> Option<Duration> {
        self.interval.checked_mul(self.timeout_multiplier)
    }

    /// Silence longer than this closes the connection.
    pub fn timeout(&self) -> Duration {
        self.checked_timeout().unwrap_or(Duration::MAX)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(25),
            timeout_multiplier: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Connections served per fanout batch before yielding to the scheduler.
    pub fanout_batch_size: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            fanout_batch_size: 256,
            outbound_buffer_size: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let server_addr: SocketAddr = server_addr
            .parse()
            .map_err(|_| ConfigLoadError::InvalidServerAddr)?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", &lookup, 10u32)?;
        if database_max_connections == 0 {
            return Err(ConfigLoadError::Invalid("DATABASE_MAX_CONNECTIONS"));
        }
        let identity_secret = lookup("IDENTITY_SECRET")
            .unwrap_or_else(|| "sonar_identity_secret_change_in_production".to_string());
        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let defaults = HeartbeatConfig::default();
        let interval_secs = parse_or("HEARTBEAT_INTERVAL_SECS", &lookup, defaults.interval.as_secs())?;
        let timeout_multiplier = parse_or(
            "HEARTBEAT_TIMEOUT_MULTIPLIER",
            &lookup,
            defaults.timeout_multiplier,
        )?;
        if interval_secs == 0 || interval_secs > MAX_HEARTBEAT_INTERVAL_SECS {
            return Err(ConfigLoadError::Invalid("HEARTBEAT_INTERVAL_SECS"));
        }
        let heartbeat = HeartbeatConfig {
            interval: Duration::from_secs(interval_secs),
            timeout_multiplier,
        };
        if timeout_multiplier == 0 || heartbeat.checked_timeout().is_none() {
            return Err(ConfigLoadError::Invalid("HEARTBEAT_TIMEOUT_MULTIPLIER"));
        }

        let realtime_defaults = RealtimeConfig::default();
        let fanout_batch_size =
            parse_or("FANOUT_BATCH_SIZE", &lookup, realtime_defaults.fanout_batch_size)?;
        let outbound_buffer_size = parse_or(
            "OUTBOUND_BUFFER_SIZE",
            &lookup,
            realtime_defaults.outbound_buffer_size,
        )?;
        if fanout_batch_size == 0 {
            return Err(ConfigLoadError::Invalid("FANOUT_BATCH_SIZE"));
        }
        if outbound_buffer_size == 0 {
            return Err(ConfigLoadError::Invalid("OUTBOUND_BUFFER_SIZE"));
        }

        Ok(Self {
            server_addr,
            database_url,
            database_max_connections,
            identity_secret,
            log_level,
            heartbeat,
            realtime: RealtimeConfig {
                fanout_batch_size,
                outbound_buffer_size,
            },
        })
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigLoadError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigLoadError::Invalid(key)),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Invalid SERVER_ADDR")]
    InvalidServerAddr,
    #[error("Invalid value for {0}")]
    Invalid(&'static str),
}
