//! Configuration types for tunrelay
//!
//! This module defines all configuration structures used by the relay core.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fakedns::FakeDnsConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// DNS hijack table
    #[serde(default)]
    pub fakedns: FakeDnsConfig,

    /// TCP relay settings
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Configured outbounds (a `direct` outbound is always added implicitly)
    #[serde(default)]
    pub proxies: Vec<ProxyConfig>,

    /// Tag used when a connection carries no routing tag
    #[serde(default)]
    pub default_proxy: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fakedns.validate()?;
        self.tcp.validate()?;

        let mut tags: HashSet<&str> = HashSet::new();
        tags.insert(crate::outbound::DEFAULT_DIRECT_TAG);
        for proxy in &self.proxies {
            let tag = proxy.tag();
            if tag.is_empty() {
                return Err(ConfigError::validation("Proxy tag must not be empty"));
            }
            if tag == crate::fakedns::BLOCK_PROXY {
                return Err(ConfigError::validation(format!(
                    "Proxy tag '{tag}' is reserved"
                )));
            }
            if !tags.insert(tag) {
                return Err(ConfigError::validation(format!(
                    "Duplicate proxy tag: {tag}"
                )));
            }
            proxy.validate()?;
        }

        if let Some(ref default) = self.default_proxy {
            if !tags.contains(default.as_str()) {
                return Err(ConfigError::validation(format!(
                    "Default proxy '{default}' not found in proxies list"
                )));
            }
        }

        self.log.validate()
    }
}

/// TCP relay configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpConfig {
    /// Idle timeout of the remote side in seconds
    ///
    /// Every read from the proxy connection must complete within this long.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Read buffer size for the remote side
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_buffer_size() -> usize {
    16 * 1024
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl TcpConfig {
    /// Set the idle timeout
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the read buffer size
    #[must_use]
    pub const fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Idle timeout of the remote side
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Validate the TCP configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if a value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "tcp idle_timeout_secs must be greater than 0",
            ));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::validation(
                "tcp buffer_size must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Outbound configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProxyConfig {
    /// Direct connection
    Direct {
        /// Unique tag
        tag: String,
    },
    /// SOCKS5 proxy
    Socks5 {
        /// Unique tag
        tag: String,
        /// Proxy server address
        server: SocketAddr,
        /// Username for authentication (optional)
        #[serde(default)]
        username: Option<String>,
        /// Password for authentication (optional)
        #[serde(default)]
        password: Option<String>,
    },
}

impl ProxyConfig {
    /// Get the tag
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Direct { tag } | Self::Socks5 { tag, .. } => tag,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Self::Socks5 {
            tag,
            username,
            password,
            ..
        } = self
        {
            if username.is_some() != password.is_some() {
                return Err(ConfigError::validation(format!(
                    "Proxy '{tag}': username and password must be set together"
                )));
            }
            let too_long = |s: &Option<String>| s.as_ref().is_some_and(|s| s.len() > 255);
            if too_long(username) || too_long(password) {
                return Err(ConfigError::validation(format!(
                    "Proxy '{tag}': credentials are limited to 255 bytes"
                )));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Include target (module path)
    #[serde(default = "default_true")]
    pub target: bool,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: true,
        }
    }
}

impl LogConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(ConfigError::validation(format!(
                "Unknown log format '{other}' (expected json or text)"
            ))),
        }
    }
}
