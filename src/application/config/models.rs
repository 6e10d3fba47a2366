use crate::common::constants::{DEFAULT_LOG_LEVEL, DEFAULT_POLL_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub reactor: ReactorConfig,

    /// Endpoints to listen on
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "netloop=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReactorConfig {
    /// Upper bound on a single multiplexer poll
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
}

/// A single listening endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenerConfig {
    pub address: IpAddr,

    /// 0 picks an ephemeral port
    pub port: u16,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_poll_timeout() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout(),
        }
    }
}

impl ReactorConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl ListenerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
