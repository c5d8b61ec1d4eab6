//! # Client Configuration
//!
//! Loaded once at startup from a TOML file. Every field has a default, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! server_address = "127.0.0.1"
//! port = 4296
//! tick_rate = 50
//!
//! [buffer]
//! capacity = 4
//! # Omit to reconcile everything buffered on each step
//! max_batch = 2
//!
//! [sync]
//! stale_delta_policy = "drop"
//! disconnect_policy = "despawn_all"
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use ember_shared::{DEFAULT_PORT, DEFAULT_TICK_RATE};
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};

/// What to do with a delta whose host tick is not newer than the last one
/// applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleDeltaPolicy {
    /// Reject non-increasing ticks.
    #[default]
    Drop,
    /// Apply every delta in arrival order.
    Apply,
}

/// What happens to remote entities when the connection drops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Leave entities in place with their last known state.
    #[default]
    Freeze,
    /// Despawn every remote entity.
    DespawnAll,
}

/// Update buffer sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    /// Deltas held before the oldest is dropped.
    pub capacity: usize,
    /// Most deltas reconciled in one fixed step. `None` drains the whole
    /// buffer each step; the rest of a bounded drain waits for the next one.
    pub max_batch: Option<usize>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        // Small on purpose: a stale delta is worth less than latency.
        Self {
            capacity: 4,
            max_batch: None,
        }
    }
}

/// Reconciliation policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Out-of-order / duplicate delta handling.
    pub stale_delta_policy: StaleDeltaPolicy,
    /// Entity cleanup on disconnect.
    pub disconnect_policy: DisconnectPolicy,
}

/// Client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Host IP address.
    pub server_address: String,
    /// Host port.
    pub port: u16,
    /// Fixed simulation steps per second.
    pub tick_rate: u32,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Update buffer sizing.
    pub buffer: BufferConfig,
    /// Reconciliation policies.
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_owned(),
            port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            log_level: "info".to_owned(),
            buffer: BufferConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] on syntax errors, unknown keys or
    /// invalid values.
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the first offending field.
    pub fn validate(&self) -> SyncResult<()> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(SyncError::Config(format!(
                "tick_rate must be in 1..=1000, got {}",
                self.tick_rate
            )));
        }
        if self.buffer.capacity == 0 {
            return Err(SyncError::Config("buffer.capacity must be at least 1".to_owned()));
        }
        if self.buffer.max_batch == Some(0) {
            return Err(SyncError::Config("buffer.max_batch must be at least 1".to_owned()));
        }
        self.server_socket_addr().map(|_| ())
    }

    /// Resolves `server_address` and `port` into a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidAddress`] if the address is not an IP.
    pub fn server_socket_addr(&self) -> SyncResult<SocketAddr> {
        parse_host(&self.server_address, self.port)
    }
}

/// Parses an IP literal and port into a socket address.
pub(crate) fn parse_host(address: &str, port: u16) -> SyncResult<SocketAddr> {
    address
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|_| SyncError::InvalidAddress(address.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.sync.stale_delta_policy, StaleDeltaPolicy::Drop);
        assert_eq!(config.sync.disconnect_policy, DisconnectPolicy::Freeze);
    }

    #[test]
    fn test_full_document() {
        let config = ClientConfig::from_toml_str(
            r#"
            server_address = "10.0.0.7"
            port = 9000
            tick_rate = 30

            [buffer]
            capacity = 16
            max_batch = 2

            [sync]
            stale_delta_policy = "apply"
            disconnect_policy = "despawn_all"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.server_socket_addr().unwrap(),
            "10.0.0.7:9000".parse().unwrap()
        );
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.buffer.capacity, 16);
        assert_eq!(config.buffer.max_batch, Some(2));
        assert_eq!(config.sync.stale_delta_policy, StaleDeltaPolicy::Apply);
        assert_eq!(config.sync.disconnect_policy, DisconnectPolicy::DespawnAll);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ClientConfig::from_toml_str("tickrate = 30").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ClientConfig::from_toml_str("[buffer]\ncapacity = 0").unwrap_err();
        assert!(err.to_string().contains("buffer.capacity"));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let err = ClientConfig::from_toml_str("[buffer]\nmax_batch = 0").unwrap_err();
        assert!(err.to_string().contains("buffer.max_batch"));
        assert_eq!(ClientConfig::default().buffer.max_batch, None);
    }

    #[test]
    fn test_hostname_is_not_an_address() {
        let err = ClientConfig::from_toml_str(r#"server_address = "example.com""#).unwrap_err();
        assert!(matches!(err, SyncError::InvalidAddress(_)));
    }
}
