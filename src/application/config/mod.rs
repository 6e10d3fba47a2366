pub mod loader;
pub mod models;
pub mod parser;
pub mod validator;

pub use loader::ConfigLoader;
pub use models::{Config, ListenerConfig, LoggingConfig, ReactorConfig};
