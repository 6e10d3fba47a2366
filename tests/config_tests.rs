// Configuration tests - verify config files are parsed and validated

use netloop::application::config::loader::ConfigLoader;
use std::fs;

fn write_temp(name: &str, content: &str) -> String {
    let path = std::env::temp_dir().join(format!("netloop_{}_{}.toml", name, std::process::id()));
    fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_valid_config_file() {
    let path = write_temp(
        "valid",
        r#"
[logging]
level = "netloop=debug"

[reactor]
poll_timeout_ms = 50

[[listeners]]
address = "0.0.0.0"
port = 7000

[[listeners]]
address = "127.0.0.1"
port = 7001
"#,
    );

    let config = ConfigLoader::load(&path).unwrap();
    assert_eq!(config.listeners.len(), 2);
    assert_eq!(config.reactor.poll_timeout_ms, 50);
    assert_eq!(config.listeners[0].socket_addr().to_string(), "0.0.0.0:7000");
    fs::remove_file(path).unwrap();
}

#[test]
fn test_unknown_shape_is_rejected() {
    let path = write_temp("invalid", "listeners = \"nope\"\n");
    assert!(ConfigLoader::load(&path).is_err());
    fs::remove_file(path).unwrap();
}

#[test]
fn test_duplicate_listener_is_rejected() {
    let path = write_temp(
        "duplicate",
        r#"
[[listeners]]
address = "127.0.0.1"
port = 7000

[[listeners]]
address = "127.0.0.1"
port = 7000
"#,
    );
    assert!(ConfigLoader::load(&path).is_err());
    fs::remove_file(path).unwrap();
}

#[test]
fn test_invalid_log_level_is_rejected() {
    let path = write_temp(
        "level",
        r#"
[logging]
level = "netloop=verbose"

[[listeners]]
address = "127.0.0.1"
port = 7000
"#,
    );
    assert!(ConfigLoader::load(&path).is_err());
    fs::remove_file(path).unwrap();
}
