//! Reader configuration.
//!
//! All cadences are plain millisecond constants with defaults matching the
//! deployed readers. The TCP reconnect interval is configuration, not a
//! hardcoded fact: deployments have run it anywhere from 2 to 10 seconds.

use serde::{Deserialize, Serialize};

/// Backend endpoint. An empty host or zero port means unconfigured, and an
/// unconfigured reader never attempts a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && self.port != 0
    }
}

/// Configuration for the session protocol engine and the scan branch of the
/// tag sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub endpoint: EndpointConfig,
    /// Minimum gap between TCP connection attempts.
    pub connect_retry_ms: u64,
    /// Minimum gap between REGISTER events while unregistered.
    pub register_interval_ms: u64,
    /// Minimum gap between AUTHENTICATE events while unauthenticated.
    pub authenticate_interval_ms: u64,
    /// Heartbeat cadence once connected.
    pub heartbeat_interval_ms: u64,
    /// Minimum gap between card detection attempts while scanning.
    pub scan_interval_ms: u64,
    /// Bound on a single card detection attempt.
    pub detect_timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            connect_retry_ms: 2_000,
            register_interval_ms: 10_000,
            authenticate_interval_ms: 10_000,
            heartbeat_interval_ms: 5_000,
            scan_interval_ms: 100,
            detect_timeout_ms: 250,
        }
    }
}

impl ReaderConfig {
    /// Default configuration pointed at the given endpoint.
    pub fn with_endpoint(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: EndpointConfig::new(host, port),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_configured_requires_host_and_port() {
        assert!(!EndpointConfig::default().is_configured());
        assert!(!EndpointConfig::new("", 4000).is_configured());
        assert!(!EndpointConfig::new("backend.local", 0).is_configured());
        assert!(EndpointConfig::new("backend.local", 4000).is_configured());
    }
}
