//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use std::time::Duration;
use tracing::Level;
use turnlink::config::{
    IoConfig, LoggingConfig, NetworkConfig, SessionConfig, DEFAULT_CLIENT_PORT, DEFAULT_HOST_PORT,
    MAX_PEERS,
};
use turnlink::error::ProtocolError;

#[test]
fn test_default_config_validates() {
    let config = NetworkConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert_eq!(config.session.host_port, DEFAULT_HOST_PORT);
    assert_eq!(config.session.client_port, Some(DEFAULT_CLIENT_PORT));
    assert_eq!(config.session.max_peers, MAX_PEERS);
}

#[test]
fn test_invalid_bind_address() {
    let mut config = NetworkConfig::default();
    config.session.bind_address = "not-an-ip".to_string();

    let errors = config.validate();
    assert!(!errors.is_empty(), "Should have validation errors");
    assert!(errors.iter().any(|e| e.contains("Invalid bind address")));
}

#[test]
fn test_empty_bind_address() {
    let mut config = NetworkConfig::default();
    config.session.bind_address = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_max_peers_bounds() {
    let mut config = NetworkConfig::default();
    config.session.max_peers = 1;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max peers must be at least 2")));

    config.session.max_peers = MAX_PEERS + 1;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max peers too large")));
}

#[test]
fn test_client_port_clashes_with_host_port() {
    let mut config = NetworkConfig::default();
    config.session.client_port = Some(config.session.host_port);

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Client port cannot equal host port")));
}

#[test]
fn test_ephemeral_ports_are_valid() {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.session.host_port = 0;
        c.session.client_port = None;
    });
    assert!(config.validate().is_empty());
}

#[test]
fn test_short_connect_timeout() {
    let mut config = NetworkConfig::default();
    config.session.connect_timeout = Duration::from_millis(50);

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Connect timeout too short")));
}

#[test]
fn test_zero_poll_interval() {
    let mut config = NetworkConfig::default();
    config.io.poll_interval = Duration::ZERO;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Poll interval cannot be 0")));
}

#[test]
fn test_drain_batch_bounds() {
    let mut config = NetworkConfig::default();
    config.io.drain_batch = 0;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Drain batch must be greater than 0")));

    config.io.drain_batch = 21;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Drain batch too large")));
}

#[test]
fn test_empty_app_name() {
    let mut config = NetworkConfig::default();
    config.logging.app_name = String::new();

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Application name cannot be empty")));
}

#[test]
fn test_long_app_name() {
    let mut config = NetworkConfig::default();
    config.logging.app_name = "a".repeat(65);

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Application name too long")));
}

#[test]
fn test_validate_strict_with_invalid_config() {
    let mut config = NetworkConfig::default();
    config.session.bind_address = String::new();
    config.io.drain_batch = 0;

    match config.validate_strict() {
        Err(ProtocolError::ConfigError(msg)) => {
            assert!(msg.contains("Configuration validation failed"));
            assert!(msg.contains("Bind address"));
            assert!(msg.contains("Drain batch"));
        }
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_toml_roundtrip_through_file() {
    let config = NetworkConfig {
        session: SessionConfig {
            bind_address: "0.0.0.0".to_string(),
            host_port: 15000,
            client_port: None,
            max_peers: 3,
            connect_timeout: Duration::from_secs(2),
        },
        io: IoConfig {
            poll_interval: Duration::from_millis(10),
            drain_batch: 8,
            write_timeout: Duration::from_millis(500),
        },
        logging: LoggingConfig {
            app_name: "dungeon".to_string(),
            log_level: Level::DEBUG,
            json_format: true,
        },
    };

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("turnlink.toml");
    config.save_to_file(&path).expect("save");

    let loaded = NetworkConfig::from_file(&path).expect("load");
    assert_eq!(loaded.session.bind_address, "0.0.0.0");
    assert_eq!(loaded.session.host_port, 15000);
    assert_eq!(loaded.session.client_port, None);
    assert_eq!(loaded.session.max_peers, 3);
    assert_eq!(loaded.io.poll_interval, Duration::from_millis(10));
    assert_eq!(loaded.io.write_timeout, Duration::from_millis(500));
    assert_eq!(loaded.logging.log_level, Level::DEBUG);
    assert!(loaded.logging.json_format);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = NetworkConfig::from_toml(
        r#"
        [session]
        bind_address = "127.0.0.1"
        host_port = 12345
        max_peers = 2
        connect_timeout = 1000
        "#,
    )
    .expect("parse");

    assert_eq!(config.session.host_port, 12345);
    assert_eq!(config.session.client_port, None);
    assert_eq!(config.io.drain_batch, 20);
    assert_eq!(config.logging.app_name, "turnlink");
}

#[test]
fn test_invalid_toml_and_missing_file() {
    assert!(matches!(
        NetworkConfig::from_toml("session = 5"),
        Err(ProtocolError::ConfigError(_))
    ));
    assert!(matches!(
        NetworkConfig::from_file("/definitely/not/here.toml"),
        Err(ProtocolError::ConfigError(_))
    ));
}

#[test]
fn test_example_config_parses() {
    let example = NetworkConfig::example_config();
    let parsed = NetworkConfig::from_toml(&example).expect("example should parse");
    assert!(parsed.validate().is_empty());
}

#[test]
fn test_env_overrides() {
    std::env::set_var("TURNLINK_HOST_PORT", "14000");
    std::env::set_var("TURNLINK_CLIENT_PORT", "0");
    std::env::set_var("TURNLINK_MAX_PEERS", "3");
    std::env::set_var("TURNLINK_POLL_INTERVAL_MS", "7");

    let config = NetworkConfig::from_env().expect("env config");
    assert_eq!(config.session.host_port, 14000);
    assert_eq!(config.session.client_port, None);
    assert_eq!(config.session.max_peers, 3);
    assert_eq!(config.io.poll_interval, Duration::from_millis(7));

    std::env::set_var("TURNLINK_MAX_PEERS", "many");
    assert!(matches!(
        NetworkConfig::from_env(),
        Err(ProtocolError::ConfigError(_))
    ));

    for key in [
        "TURNLINK_HOST_PORT",
        "TURNLINK_CLIENT_PORT",
        "TURNLINK_MAX_PEERS",
        "TURNLINK_POLL_INTERVAL_MS",
    ] {
        std::env::remove_var(key);
    }
}
