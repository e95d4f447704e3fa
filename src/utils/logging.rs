//! Logging system setup
//!
//! Installs the process-wide `tracing` subscriber used by every session.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system
///
/// The filter honours `RUST_LOG` and falls back to `config.log_level`.
/// Output is plain text or JSON depending on `config.json_format`.
///
/// Only one global subscriber can exist per process; calling this again
/// returns [`ProtocolError::ConfigError`].
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_ascii_lowercase()));

    let installed = if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
    };

    installed.map_err(|e| {
        ProtocolError::ConfigError(format!("Failed to install logger for {}: {e}", config.app_name))
    })?;

    tracing::debug!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}
