use netloop::application::config::loader::ConfigLoader;
use netloop::application::server::server_manager::ServerManager;
use netloop::common::logger;
use netloop::core::net::sys::LibcSocketApi;
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <config_file>", args[0]);
        std::process::exit(1);
    }

    let config_path = &args[1];
    let config = match ConfigLoader::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error parsing config file: {}", e);
            std::process::exit(1);
        }
    };

    logger::init(&config.logging.level);

    let mut server_manager = match ServerManager::new(&config, Arc::new(LibcSocketApi::new())) {
        Ok(sm) => sm,
        Err(e) => {
            error!(error = %e, "failed to start listeners");
            std::process::exit(1);
        }
    };

    server_manager.log_listeners();

    let result = server_manager.run(|conn| {
        info!(peer = %conn.peer_addr(), "connection accepted");
        if let Err(e) = conn.close() {
            warn!(error = %e, "failed to close connection");
        }
    });

    if let Err(e) = result {
        error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}
