pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// How long `ServerManager::run` blocks on the event queue per iteration.
pub const DEFAULT_EVENT_WAIT_MS: u64 = 250;

pub const MAX_POLL_TIMEOUT_MS: u64 = 60_000;
