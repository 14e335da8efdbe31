//! Node configuration.
//!
//! A node is configured from an optional JSON file overlaid by command-line
//! flags. Every field has a default except `local_address`, the address this
//! node falls back to (and serves as) when no candidate is reachable.
//!
//! ```json
//! {
//!   "roots": ["host1", "host2", "host3"],
//!   "local_address": "host2",
//!   "sync_port": 6350,
//!   "probe_timeout_ms": 1000,
//!   "sync_interval_ms": 10000
//! }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mastersync_core::Address;
use mastersync_runtime::{FrameCodec, ReconnectConfig, ServerOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default coordination port.
pub const DEFAULT_SYNC_PORT: u16 = 6350;

/// Default probe connect timeout in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1_000;

/// Default interval between evaluations in milliseconds.
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 10_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`NodeConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// No local address was configured.
    #[error("local_address is required")]
    MissingLocalAddress,

    /// A configured address was rejected.
    #[error("invalid address: {0}")]
    Address(#[from] mastersync_core::Error),

    /// A numeric setting is out of range.
    #[error("{field} must be non-zero")]
    Zero {
        /// The offending field.
        field: &'static str,
    },

    /// Transport settings are inconsistent.
    #[error("invalid transport settings: {0}")]
    Transport(#[from] mastersync_runtime::ConfigError),
}

/// Node configuration as read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Candidate addresses, in any order.
    pub roots: Vec<String>,
    /// This node's externally resolved address.
    pub local_address: Option<String>,
    /// Coordination port for probes, sync connections and notifications.
    pub sync_port: u16,
    /// Probe connect timeout in milliseconds.
    pub probe_timeout_ms: u64,
    /// Interval between evaluations in milliseconds.
    pub sync_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            local_address: None,
            sync_port: DEFAULT_SYNC_PORT,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
        }
    }
}

impl NodeConfig {
    /// Loads a config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if an address is invalid or a setting is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_port == 0 {
            return Err(ConfigError::Zero { field: "sync_port" });
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "probe_timeout_ms",
            });
        }
        if self.sync_interval_ms == 0 {
            return Err(ConfigError::Zero {
                field: "sync_interval_ms",
            });
        }
        self.local()?;
        self.candidates()?;
        Ok(())
    }

    /// Returns the parsed local address.
    ///
    /// # Errors
    /// Returns an error if it is missing or invalid.
    pub fn local(&self) -> Result<Address, ConfigError> {
        let local = self
            .local_address
            .as_deref()
            .ok_or(ConfigError::MissingLocalAddress)?;
        Ok(Address::new(local)?)
    }

    /// Returns the parsed candidate set.
    ///
    /// # Errors
    /// Returns an error on the first invalid root.
    pub fn candidates(&self) -> Result<Vec<Address>, ConfigError> {
        self.roots
            .iter()
            .map(|root| Address::new(root.as_str()).map_err(ConfigError::from))
            .collect()
    }

    /// Returns the probe timeout.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Returns the evaluation interval.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Builds the transport settings for this node.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn settings(&self) -> Result<SyncSettings, ConfigError> {
        self.validate()?;
        let settings = SyncSettings::new(self.local()?, self.sync_port)
            .with_notify_timeout(self.probe_timeout());
        settings.validate()?;
        Ok(settings)
    }
}

/// Everything the transport driver needs to run this node's sync links.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// This node's externally resolved address.
    pub local: Address,
    /// Coordination port.
    pub sync_port: u16,
    /// Interface the sync server binds.
    pub bind_ip: IpAddr,
    /// Reconnect policy for the sync client.
    pub reconnect: ReconnectConfig,
    /// Restart policy for the sync server.
    pub server: ServerOptions,
    /// Framing for sync connections and notifications.
    pub codec: FrameCodec,
    /// Bound on delivering one notification.
    pub notify_timeout: Duration,
}

impl SyncSettings {
    /// Creates production settings.
    #[must_use]
    pub fn new(local: Address, sync_port: u16) -> Self {
        Self {
            local,
            sync_port,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            reconnect: ReconnectConfig::default(),
            server: ServerOptions::default(),
            codec: FrameCodec::default(),
            notify_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        }
    }

    /// Creates settings suitable for testing (loopback, millisecond delays).
    #[must_use]
    pub fn fast_for_testing(local: Address, sync_port: u16) -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            reconnect: ReconnectConfig::fast_for_testing(),
            server: ServerOptions::fast_for_testing(),
            notify_timeout: Duration::from_millis(500),
            ..Self::new(local, sync_port)
        }
    }

    /// Sets the notification timeout.
    #[must_use]
    pub const fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Returns the address the sync server binds.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.sync_port)
    }

    /// Returns `host:port` for `address` on the coordination port.
    #[must_use]
    pub fn endpoint(&self, address: &Address) -> String {
        address.with_port(self.sync_port)
    }

    /// Validates the transport settings.
    ///
    /// # Errors
    /// Returns an error if the reconnect or server options are inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reconnect.validate()?;
        self.server.validate()?;
        if self.notify_timeout.is_zero() {
            return Err(ConfigError::Zero {
                field: "notify_timeout",
            });
        }
        Ok(())
    }
}
