//! Transport configuration.
//!
//! Reliability settings for [`NetClient`](crate::NetClient) and
//! [`NetServer`](crate::NetServer).

use std::time::Duration;

/// Reconnect and connection settings for a client.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Enable `SO_KEEPALIVE` on the connection.
    pub keep_alive: bool,
    /// Reconnect after the connection ends or a connect attempt fails.
    pub auto_reconnect: bool,
    /// Also reconnect when the peer closed the connection cleanly.
    pub reconnect_on_clean_close: bool,
    /// Growth factor applied to the delay after each failure (> 1).
    pub multiplier: f64,
    /// Delay before the first retry.
    pub floor: Duration,
    /// Upper bound for any retry delay.
    pub ceiling: Duration,
    /// Bound on a single connect attempt, including name resolution.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            auto_reconnect: true,
            reconnect_on_clean_close: true,
            multiplier: 1.5,
            floor: Duration::from_secs(5),
            ceiling: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ReconnectConfig {
    /// Creates a config suitable for testing (millisecond delays).
    #[must_use]
    pub fn fast_for_testing() -> Self {
        Self {
            floor: Duration::from_millis(20),
            ceiling: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Sets whether the client reconnects at all.
    #[must_use]
    pub const fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets whether a clean close by the peer triggers a reconnect.
    #[must_use]
    pub const fn with_reconnect_on_clean_close(mut self, enabled: bool) -> Self {
        self.reconnect_on_clean_close = enabled;
        self
    }

    /// Sets the backoff floor, ceiling and multiplier.
    #[must_use]
    pub fn with_backoff(mut self, floor: Duration, ceiling: Duration, multiplier: f64) -> Self {
        self.floor = floor;
        self.ceiling = ceiling;
        self.multiplier = multiplier;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validates the reconnect configuration.
    ///
    /// # Errors
    /// Returns an error if the backoff parameters are inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(ConfigError::InvalidBackoff {
                message: format!("multiplier must be > 1, got {}", self.multiplier),
            });
        }

        if self.floor.is_zero() {
            return Err(ConfigError::InvalidBackoff {
                message: "floor must be non-zero".to_string(),
            });
        }

        if self.ceiling < self.floor {
            return Err(ConfigError::InvalidBackoff {
                message: "ceiling must be >= floor".to_string(),
            });
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                message: "connect_timeout must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Listener settings for a server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Enable `SO_KEEPALIVE` on accepted connections.
    pub keep_alive: bool,
    /// Rebind after an unexpected listener failure.
    pub auto_restart: bool,
    /// Delay before rebinding.
    pub restart_delay: Duration,
    /// Listen backlog.
    pub backlog: u32,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            keep_alive: true,
            auto_restart: true,
            restart_delay: Duration::from_millis(500),
            backlog: 50,
        }
    }
}

impl ServerOptions {
    /// Creates options suitable for testing (short restart delay).
    #[must_use]
    pub fn fast_for_testing() -> Self {
        Self {
            restart_delay: Duration::from_millis(20),
            ..Self::default()
        }
    }

    /// Sets whether the server rebinds after an unexpected failure.
    #[must_use]
    pub const fn with_auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    /// Sets the restart delay.
    #[must_use]
    pub const fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Validates the server options.
    ///
    /// # Errors
    /// Returns an error if the backlog is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::InvalidListener {
                message: "backlog must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid backoff configuration.
    InvalidBackoff {
        /// Error description.
        message: String,
    },
    /// Invalid timeout configuration.
    InvalidTimeout {
        /// Error description.
        message: String,
    },
    /// Invalid listener configuration.
    InvalidListener {
        /// Error description.
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBackoff { message } => write!(f, "invalid backoff: {message}"),
            Self::InvalidTimeout { message } => write!(f, "invalid timeout: {message}"),
            Self::InvalidListener { message } => write!(f, "invalid listener: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reconnect_is_valid() {
        let config = ReconnectConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.floor, Duration::from_secs(5));
        assert_eq!(config.ceiling, Duration::from_secs(30));
    }

    #[test]
    fn test_fast_reconnect_is_valid() {
        assert!(ReconnectConfig::fast_for_testing().validate().is_ok());
    }

    #[test]
    fn test_multiplier_must_exceed_one() {
        let config = ReconnectConfig::default().with_backoff(
            Duration::from_secs(1),
            Duration::from_secs(2),
            1.0,
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBackoff { .. })
        ));

        let config = ReconnectConfig::default().with_backoff(
            Duration::from_secs(1),
            Duration::from_secs(2),
            f64::NAN,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ceiling_below_floor() {
        let config = ReconnectConfig::default().with_backoff(
            Duration::from_secs(10),
            Duration::from_secs(5),
            2.0,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_connect_timeout() {
        let config = ReconnectConfig::default().with_connect_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn test_server_options() {
        let options = ServerOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.restart_delay, Duration::from_millis(500));
        assert_eq!(options.backlog, 50);

        let options = ServerOptions {
            backlog: 0,
            ..ServerOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
