use crate::application::config::models::{Config, ListenerConfig};
use crate::common::constants::MAX_POLL_TIMEOUT_MS;
use crate::common::error::{ReactorError, Result};
use std::collections::HashSet;
use tracing_subscriber::EnvFilter;

/// Validate configuration for correctness and consistency
pub fn validate_config(config: &Config) -> Result<()> {
    if config.reactor.poll_timeout_ms == 0 || config.reactor.poll_timeout_ms > MAX_POLL_TIMEOUT_MS {
        return Err(ReactorError::Config(format!(
            "poll_timeout_ms must be between 1 and {}",
            MAX_POLL_TIMEOUT_MS
        )));
    }

    EnvFilter::try_new(&config.logging.level).map_err(|e| {
        ReactorError::Config(format!(
            "Invalid log level '{}': {}",
            config.logging.level, e
        ))
    })?;

    if config.listeners.is_empty() {
        return Err(ReactorError::Config(
            "At least one listener must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (idx, listener) in config.listeners.iter().enumerate() {
        validate_listener(listener, idx)?;

        // port 0 is ephemeral, so repeats never collide
        if listener.port != 0 && !seen.insert(listener.socket_addr()) {
            return Err(ReactorError::Config(format!(
                "Listener {} duplicates {}",
                idx,
                listener.socket_addr()
            )));
        }
    }

    Ok(())
}

fn validate_listener(listener: &ListenerConfig, index: usize) -> Result<()> {
    if !listener.address.is_ipv4() {
        return Err(ReactorError::Config(format!(
            "Listener {}: only IPv4 addresses are supported, got {}",
            index, listener.address
        )));
    }
    Ok(())
}
