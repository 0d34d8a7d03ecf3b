//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::net::sync::{SyncConfig, STALE_AFTER_MS};
use crate::util::rate_limit::RELAY_RATE_LIMIT;
use crate::util::time::{BROADCAST_INTERVAL_MS, SIMULATION_TPS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Relay binding address
    pub relay_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS ("*" for any)
    pub client_origin: String,
    /// Max broadcast frames per second accepted from one relay connection
    pub relay_messages_per_sec: u32,

    /// WebSocket URL of the relay (client mode)
    pub relay_url: String,
    /// Match the client joins
    pub match_id: u64,
    /// Local player id (random when unset)
    pub player_id: u64,
    /// Local player display name
    pub player_name: String,

    /// Minimum gap between two state broadcasts
    pub broadcast_interval_ms: u64,
    /// Remote peers silent for longer than this are dropped (None = never)
    pub stale_after_ms: Option<u64>,
    /// Fixed simulation rate of the client loop
    pub simulation_tps: u32,
    /// Where the client writes its match replay (None = no recording)
    pub replay_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to RELAY_ADDR or default
        let relay_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("RELAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let stale_after_ms: u64 = parse_or("STALE_AFTER_MS", STALE_AFTER_MS)?;

        Ok(Self {
            relay_addr: relay_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            relay_messages_per_sec: parse_or("RELAY_MESSAGES_PER_SEC", RELAY_RATE_LIMIT)?,

            relay_url: env::var("RELAY_URL")
                .unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string()),
            match_id: parse_or("MATCH_ID", 1)?,
            player_id: match env::var("PLAYER_ID") {
                Ok(raw) => parse_value("PLAYER_ID", &raw)?,
                Err(_) => rand::random::<u32>() as u64,
            },
            player_name: env::var("PLAYER_NAME").unwrap_or_else(|_| "Player".to_string()),

            broadcast_interval_ms: parse_or("BROADCAST_INTERVAL_MS", BROADCAST_INTERVAL_MS)?,
            stale_after_ms: (stale_after_ms > 0).then_some(stale_after_ms),
            simulation_tps: parse_or("SIMULATION_TPS", SIMULATION_TPS)?,
            replay_path: env::var("REPLAY_PATH")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

impl Config {
    /// Peer sync settings derived from this configuration
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            broadcast_interval_ms: self.broadcast_interval_ms,
            stale_after_ms: self.stale_after_ms,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: "*".to_string(),
            relay_messages_per_sec: RELAY_RATE_LIMIT,
            relay_url: "ws://127.0.0.1:8080/ws".to_string(),
            match_id: 1,
            player_id: 1,
            player_name: "Player".to_string(),
            broadcast_interval_ms: BROADCAST_INTERVAL_MS,
            stale_after_ms: Some(STALE_AFTER_MS),
            simulation_tps: SIMULATION_TPS,
            replay_path: None,
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid relay address format")]
    InvalidAddress,
}
