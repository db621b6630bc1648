//! Configuration types for the DIMSE service boundary

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::DEFAULT_DIMSE_PORT;

/// Configuration for the inbound DIMSE service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseConfig {
    /// Local Application Entity Title
    pub local_aet: String,

    /// Bind address for the SCP listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port for the SCP listener
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of concurrent associations
    #[serde(default = "default_max_associations")]
    pub max_associations: u32,

    /// Idle association timeout in milliseconds
    #[serde(default = "default_association_timeout")]
    pub association_timeout_ms: u64,

    /// Enable the C-ECHO service
    #[serde(default = "default_true")]
    pub enable_echo: bool,

    /// Enable the C-FIND service
    #[serde(default = "default_true")]
    pub enable_find: bool,

    /// Enable the C-MOVE/C-GET services
    #[serde(default = "default_true")]
    pub enable_retrieve: bool,
}

impl Default for DimseConfig {
    fn default() -> Self {
        Self {
            local_aet: "ARCHIVE".to_string(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            max_associations: default_max_associations(),
            association_timeout_ms: default_association_timeout(),
            enable_echo: true,
            enable_find: true,
            enable_retrieve: true,
        }
    }
}

impl DimseConfig {
    /// Get the idle association timeout as Duration
    pub fn association_timeout(&self) -> Duration {
        Duration::from_millis(self.association_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.local_aet.is_empty() || self.local_aet.len() > 16 {
            return Err(crate::error::DimseError::config(
                "Local AE title must be 1-16 characters",
            ));
        }

        if self.port == 0 {
            return Err(crate::error::DimseError::config(
                "Port must be greater than 0",
            ));
        }

        if self.max_associations == 0 {
            return Err(crate::error::DimseError::config(
                "Max associations must be greater than 0",
            ));
        }

        Ok(())
    }
}

// Default value functions
fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    DEFAULT_DIMSE_PORT
}

fn default_max_associations() -> u32 {
    16
}

fn default_association_timeout() -> u64 {
    300_000 // 5 minutes
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DimseConfig::default();
        assert_eq!(config.local_aet, "ARCHIVE");
        assert_eq!(config.port, DEFAULT_DIMSE_PORT);
        assert!(config.enable_echo);
        assert!(config.enable_find);
        assert!(config.enable_retrieve);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DimseConfig::default();
        assert!(config.validate().is_ok());

        // Invalid AE title
        config.local_aet = "".to_string();
        assert!(config.validate().is_err());

        config.local_aet = "A".repeat(17);
        assert!(config.validate().is_err());

        // Invalid port
        config.local_aet = "ARCHIVE".to_string();
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_association_timeout_conversion() {
        let config = DimseConfig {
            association_timeout_ms: 2_500,
            ..Default::default()
        };
        assert_eq!(config.association_timeout(), Duration::from_millis(2_500));
    }
}
