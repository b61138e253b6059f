use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, error, warn};

use crate::relay::RelayConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Directory holding the browser assets
    #[serde(default = "default_front_dir")]
    pub front_dir: String,

    /// Longest accepted room id, in bytes
    #[serde(default = "default_room_id_max_len")]
    pub room_id_max_len: usize,

    // Relay timings
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_ws_send_wait_secs")]
    pub ws_send_wait_secs: u64,
    #[serde(default = "default_ws_pong_wait_secs")]
    pub ws_pong_wait_secs: u64,
    #[serde(default = "default_ws_ping_period_secs")]
    pub ws_ping_period_secs: u64,

    /// Largest websocket message accepted from a client, in bytes
    #[serde(default = "default_ws_max_message_size")]
    pub ws_max_message_size: usize,

    /// Outbound frames queued per connection before new ones are dropped
    #[serde(default = "default_ws_send_buffer_size")]
    pub ws_send_buffer_size: usize,

    /// How long shutdown waits for rooms to drain
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Settings consumed by the relay core
    pub fn relay_config(&self) -> RelayConfig {
        let relay = RelayConfig {
            sync_interval: Duration::from_secs(self.sync_interval_secs),
            send_wait: Duration::from_secs(self.ws_send_wait_secs),
            pong_wait: Duration::from_secs(self.ws_pong_wait_secs),
            ping_period: Duration::from_secs(self.ws_ping_period_secs),
            max_message_size: self.ws_max_message_size,
            send_buffer_size: self.ws_send_buffer_size,
        };
        if relay.ping_period >= relay.pong_wait {
            warn!(
                "WS_PING_PERIOD_SECS ({}) should be shorter than WS_PONG_WAIT_SECS ({}); idle connections will time out",
                self.ws_ping_period_secs, self.ws_pong_wait_secs
            );
        }
        relay
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            front_dir: default_front_dir(),
            room_id_max_len: default_room_id_max_len(),
            sync_interval_secs: default_sync_interval_secs(),
            ws_send_wait_secs: default_ws_send_wait_secs(),
            ws_pong_wait_secs: default_ws_pong_wait_secs(),
            ws_ping_period_secs: default_ws_ping_period_secs(),
            ws_max_message_size: default_ws_max_message_size(),
            ws_send_buffer_size: default_ws_send_buffer_size(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_front_dir() -> String {
    "front".to_string()
}

fn default_room_id_max_len() -> usize {
    32
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_ws_send_wait_secs() -> u64 {
    10
}

fn default_ws_pong_wait_secs() -> u64 {
    40
}

fn default_ws_ping_period_secs() -> u64 {
    30
}

fn default_ws_max_message_size() -> usize {
    1024
}

fn default_ws_send_buffer_size() -> usize {
    16
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}
