use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over `level`.
/// Later calls are no-ops.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
