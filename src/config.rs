//! # Configuration Management
//!
//! Centralized configuration for a turnlink session.
//!
//! This module provides structured configuration for hosting and joining,
//! the background I/O loop cadence, and logging output.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Ports
//! The host listens on `host_port`; a joining client binds `client_port` locally
//! before dialing out. Either may be set to ephemeral (`0` / `None`), which is
//! what the test suite does so sessions can run side by side.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Hard ceiling on participants in one session, host included
pub const MAX_PEERS: usize = 4;

/// Port the host listens on unless configured otherwise
pub const DEFAULT_HOST_PORT: u16 = 12000;

/// Local port a joining client binds before connecting
pub const DEFAULT_CLIENT_PORT: u16 = 13000;

/// Default I/O loop cycle period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Default timeout for dialing the host
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for writing one frame
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Hosting/joining parameters
    #[serde(default)]
    pub session: SessionConfig,

    /// Background I/O loop parameters
    #[serde(default)]
    pub io: IoConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    ///
    /// Unset variables keep their defaults; set but unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("TURNLINK_BIND_ADDRESS") {
            config.session.bind_address = addr;
        }

        if let Some(port) = env_parse::<u16>("TURNLINK_HOST_PORT")? {
            config.session.host_port = port;
        }

        if let Ok(port) = std::env::var("TURNLINK_CLIENT_PORT") {
            config.session.client_port = match port.trim() {
                "" | "0" => None,
                value => Some(value.parse::<u16>().map_err(|e| {
                    ProtocolError::ConfigError(format!("Invalid TURNLINK_CLIENT_PORT: {e}"))
                })?),
            };
        }

        if let Some(max_peers) = env_parse::<usize>("TURNLINK_MAX_PEERS")? {
            config.session.max_peers = max_peers;
        }

        if let Some(millis) = env_parse::<u64>("TURNLINK_POLL_INTERVAL_MS")? {
            config.io.poll_interval = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.session.validate());
        errors.extend(self.io.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ProtocolError::ConfigError(format!("Invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Hosting and joining parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Local interface for the listening socket and the client's outbound socket
    pub bind_address: String,

    /// Host listening port; `0` picks an ephemeral port
    pub host_port: u16,

    /// Local port bound by a joining client; `None` lets the OS choose
    pub client_port: Option<u16>,

    /// Peer table capacity, host included
    pub max_peers: usize,

    /// Timeout for a client dialing the host
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("127.0.0.1"),
            host_port: DEFAULT_HOST_PORT,
            client_port: Some(DEFAULT_CLIENT_PORT),
            max_peers: MAX_PEERS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Validate session configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("Bind address cannot be empty".to_string());
        } else if self.bind_address.parse::<IpAddr>().is_err() {
            errors.push(format!(
                "Invalid bind address: '{}' (expected an IP address such as '127.0.0.1')",
                self.bind_address
            ));
        }

        if self.max_peers < 2 {
            errors.push("Max peers must be at least 2 (host plus one client)".to_string());
        } else if self.max_peers > MAX_PEERS {
            errors.push(format!(
                "Max peers too large: {} (maximum: {MAX_PEERS})",
                self.max_peers
            ));
        }

        if self.host_port != 0 && self.client_port == Some(self.host_port) {
            errors.push(format!(
                "Client port cannot equal host port ({})",
                self.host_port
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        errors
    }

    /// Listening address for the host
    pub fn host_addr(&self) -> Result<std::net::SocketAddr> {
        let ip = self
            .bind_address
            .parse::<IpAddr>()
            .map_err(|_| ProtocolError::InvalidAddress(self.bind_address.clone()))?;
        Ok(std::net::SocketAddr::new(ip, self.host_port))
    }
}

/// I/O loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IoConfig {
    /// Period of one read/flush cycle
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Outbound entries written per cycle (capped at 20)
    pub drain_batch: usize,

    /// Timeout for writing one frame to a peer
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain_batch: crate::transport::MAX_DRAIN_BATCH,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl IoConfig {
    /// Validate I/O configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.poll_interval.is_zero() {
            errors.push("Poll interval cannot be 0".to_string());
        } else if self.poll_interval.as_secs() > 1 {
            errors.push("Poll interval too long (maximum: 1s)".to_string());
        }

        if self.drain_batch == 0 {
            errors.push("Drain batch must be greater than 0".to_string());
        } else if self.drain_batch > crate::transport::MAX_DRAIN_BATCH {
            errors.push(format!(
                "Drain batch too large: {} (maximum: {})",
                self.drain_batch,
                crate::transport::MAX_DRAIN_BATCH
            ));
        }

        if self.write_timeout.as_millis() < 10 {
            errors.push("Write timeout too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("turnlink"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
