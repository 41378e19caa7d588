//! Server configuration.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Environment variable overriding the bind host.
pub const HOST_ENV: &str = "STRICTLY_CHESS_HOST";
/// Environment variable overriding the bind port.
pub const PORT_ENV: &str = "STRICTLY_CHESS_PORT";

/// Settings for one chess session server.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    port: u16,

    /// Capacity of the host command queue.
    #[serde(default = "default_command_buffer")]
    command_buffer: usize,

    /// Capacity of the session event channel.
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,

    /// Optional starting position; must have White to move.
    #[serde(default)]
    starting_fen: Option<String>,
}

#[instrument]
fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[instrument]
fn default_port() -> u16 {
    3000
}

#[instrument]
fn default_command_buffer() -> usize {
    64
}

#[instrument]
fn default_event_capacity() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            command_buffer: default_command_buffer(),
            event_capacity: default_event_capacity(),
            starting_fen: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(host = %config.host, port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Applies `STRICTLY_CHESS_HOST` and `STRICTLY_CHESS_PORT` from the environment.
    #[instrument(skip(self))]
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let host = std::env::var(HOST_ENV).ok();
        let port = std::env::var(PORT_ENV).ok();
        self.with_overrides(host, port.as_deref())
    }

    /// Applies optional host and port overrides, as given on the command line
    /// or in the environment.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(host) = host {
            debug!(%host, "Overriding host");
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port.parse().map_err(|e| {
                warn!(port, "Rejected port override");
                ConfigError::new(format!("Invalid port '{}': {}", port, e))
            })?;
        }
        Ok(self)
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(*config.port(), 3000);
        assert!(config.starting_fen().is_none());
    }

    #[test]
    fn test_overrides_replace_host_and_port() {
        let config = ServerConfig::default()
            .with_overrides(Some("0.0.0.0".to_string()), Some("8080"))
            .unwrap();
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(*config.port(), 8080);
    }

    #[test]
    fn test_bad_port_override_is_located_error() {
        let err = ServerConfig::default()
            .with_overrides(None, Some("not-a-port"))
            .unwrap_err();
        assert!(err.message.contains("not-a-port"));
        assert!(err.file.ends_with("config.rs"));
    }
}
