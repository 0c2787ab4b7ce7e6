//! Configuration types for the HTTP service

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Log levels accepted by [`LoggingConfig::level`].
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check values that serde accepts but the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "server.host must not be empty".to_string(),
            });
        }

        if self.server.forward_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "server.forward_timeout_seconds must be greater than zero".to_string(),
            });
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "logging.level '{}' is not one of {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on. Zero asks the OS for a free port.
    pub port: u16,

    /// Upper bound on one outbound forward, in seconds
    pub forward_timeout_seconds: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1337,
            forward_timeout_seconds: 5,
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for the relay's own crates
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to read configuration from {source_name}: {message}")]
    Unreadable { source_name: String, message: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
