//! FakeDNS configuration types
//!
//! This module provides configuration for the hijack table and its
//! synthetic address pool.

use std::net::Ipv4Addr;
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default sliding TTL for hijack records, also used as the TTL of forged answers
pub const DEFAULT_TTL_SECS: u64 = 600;

/// Default reaper tick
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Configuration for the hijack table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FakeDnsConfig {
    /// Whether DNS hijacking is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address of the virtual interface inside the synthetic subnet
    ///
    /// Never handed out to a domain.
    #[serde(default = "default_gateway")]
    pub gateway: Ipv4Addr,

    /// Reserved subnet synthetic addresses are drawn from
    ///
    /// Default: 198.18.0.0/15 (RFC 2544 benchmarking range)
    #[serde(default = "default_network")]
    pub network: Ipv4Net,

    /// Sliding TTL of hijack records in seconds
    ///
    /// Every lookup pushes the expiry forward by this much.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval of the background reaper in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_gateway() -> Ipv4Addr {
    Ipv4Addr::new(198, 18, 0, 1)
}

fn default_network() -> Ipv4Net {
    Ipv4Net::new_assert(Ipv4Addr::new(198, 18, 0, 0), 15)
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

impl Default for FakeDnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gateway: default_gateway(),
            network: default_network(),
            ttl_secs: DEFAULT_TTL_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl FakeDnsConfig {
    /// Create a new FakeDnsConfig with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the synthetic subnet and the gateway inside it
    #[must_use]
    pub fn with_network(mut self, gateway: Ipv4Addr, network: Ipv4Net) -> Self {
        self.gateway = gateway;
        self.network = network;
        self
    }

    /// Set the record TTL
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    /// Set the cleanup interval
    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_secs = interval.as_secs();
        self
    }

    /// Enable or disable hijacking
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sliding TTL of hijack records
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Reaper tick
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the subnet cannot hold any
    /// synthetic address or a duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.prefix_len() > 30 {
            return Err(ConfigError::validation(format!(
                "fakedns network {} is too small (prefix must be /30 or shorter)",
                self.network
            )));
        }
        if self.ttl_secs == 0 {
            return Err(ConfigError::validation("fakedns ttl_secs must be positive"));
        }
        if u32::try_from(self.ttl_secs).is_err() {
            return Err(ConfigError::validation(
                "fakedns ttl_secs does not fit a DNS TTL",
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::validation(
                "fakedns cleanup_interval_secs must be positive",
            ));
        }
        Ok(())
    }
}
