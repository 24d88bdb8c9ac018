use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tapgate_core::config::{EndpointConfig, ReaderConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Agent configuration, loaded from a TOML file or the environment.
///
/// An empty `server_host` leaves the reader idle but running: the core
/// treats an unconfigured endpoint as "never connect".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server_host: String,
    pub server_port: u16,

    /// Where the reader identity is persisted.
    pub identity_path: PathBuf,

    // Cadences; see the core defaults for the deployed values.
    pub connect_retry_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub scan_interval_ms: u64,
    pub detect_timeout_ms: u64,

    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let reader = ReaderConfig::default();
        Self {
            server_host: String::new(),
            server_port: 0,
            identity_path: PathBuf::from("tapgate-identity.json"),
            connect_retry_ms: reader.connect_retry_ms,
            heartbeat_interval_ms: reader.heartbeat_interval_ms,
            scan_interval_ms: reader.scan_interval_ms,
            detect_timeout_ms: reader.detect_timeout_ms,
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(e.to_string()))?;

        let config: AgentConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("TAPGATE_SERVER_HOST") {
            config.server_host = host;
        }
        if let Ok(port) = std::env::var("TAPGATE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server_port = port;
            }
        }
        if let Ok(path) = std::env::var("TAPGATE_IDENTITY_PATH") {
            config.identity_path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_host.is_empty() && self.server_port == 0 {
            return Err(ConfigError::ValidationError(
                "server_port is required when server_host is set".into(),
            ));
        }
        if self.connect_retry_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_retry_ms must be nonzero".into(),
            ));
        }
        if self.identity_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "identity_path must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The core configuration derived from this agent configuration.
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            endpoint: EndpointConfig::new(self.server_host.clone(), self.server_port),
            connect_retry_ms: self.connect_retry_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            scan_interval_ms: self.scan_interval_ms,
            detect_timeout_ms: self.detect_timeout_ms,
            ..ReaderConfig::default()
        }
    }
}
