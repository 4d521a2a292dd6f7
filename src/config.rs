use crate::error::{NadError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Port the receiver's IP control interface listens on
pub const DEFAULT_PORT: u16 = 23;

const DEFAULT_READY_TIMEOUT_SECS: f64 = 10.0;

/// Connection settings for one receiver.
///
/// Fixed for the lifetime of a client. Missing fields take their defaults
/// when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Hostname or IP address of the receiver
    pub host: String,

    /// TCP port of the control interface
    pub port: u16,

    /// Reconnect automatically after failures and connection loss
    pub auto_reconnect: bool,

    /// How long setup waits for the device to report its model
    pub ready_timeout_secs: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            auto_reconnect: true,
            ready_timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
        }
    }
}

impl ConnectionConfig {
    /// Settings for a receiver at `host` on the default port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Device-ready timeout as a `Duration`.
    ///
    /// Negative or NaN settings give zero; anything too large for a
    /// `Duration` saturates to `Duration::MAX`.
    pub fn ready_timeout(&self) -> Duration {
        if self.ready_timeout_secs.is_nan() || self.ready_timeout_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.ready_timeout_secs).unwrap_or(Duration::MAX)
    }

    /// Reject settings a client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(NadError::InvalidConfig("host is empty".to_string()));
        }
        if !self.ready_timeout_secs.is_finite() || self.ready_timeout_secs < 0.0 {
            return Err(NadError::InvalidConfig(format!(
                "ready timeout must be a non-negative number of seconds, got {}",
                self.ready_timeout_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{ "host": "192.168.1.40" }"#).unwrap();

        assert_eq!(config.host, "192.168.1.40");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.auto_reconnect);
        assert_eq!(config.ready_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = ConnectionConfig::new("amp.local")
            .with_port(14999)
            .with_auto_reconnect(false)
            .with_ready_timeout(Duration::from_millis(2500));

        assert_eq!(config.port, 14999);
        assert!(!config.auto_reconnect);
        assert_eq!(config.ready_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_host = ConnectionConfig::new("  ");
        assert!(matches!(empty_host.validate(), Err(NadError::InvalidConfig(_))));

        let mut negative = ConnectionConfig::new("amp.local");
        negative.ready_timeout_secs = -1.0;
        assert!(matches!(negative.validate(), Err(NadError::InvalidConfig(_))));

        let mut nan = ConnectionConfig::new("amp.local");
        nan.ready_timeout_secs = f64::NAN;
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_huge_ready_timeout_saturates() {
        let mut config = ConnectionConfig::new("amp.local");
        config.ready_timeout_secs = 1e19;
        assert!(config.validate().is_ok());
        assert_eq!(config.ready_timeout(), Duration::from_secs(10_000_000_000_000_000_000));

        config.ready_timeout_secs = 1e300;
        assert!(config.validate().is_ok());
        assert_eq!(config.ready_timeout(), Duration::MAX);
    }
}
