//! Proxy dialer
//!
//! Registry of outbounds keyed by routing tag. The tunnel dials through it
//! with the tag stored in the hijack record; the empty tag selects the
//! configured default outbound.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::direct::DirectOutbound;
use super::socks5::{Socks5Config, Socks5Outbound};
use super::traits::{Dialer, Outbound, RemoteConn, TargetAddr};
use crate::config::{Config, ProxyConfig};
use crate::error::DialError;

/// Tag of the outbound registered when no default is configured
pub const DEFAULT_DIRECT_TAG: &str = "direct";

/// Dials targets through tagged outbounds
pub struct ProxyDialer {
    /// Map of outbound tag to outbound implementation
    outbounds: DashMap<String, Arc<dyn Outbound>>,
    /// Tag used for the empty routing tag
    default_tag: RwLock<String>,
}

impl ProxyDialer {
    /// Create an empty dialer whose default is `default_tag`
    pub fn new(default_tag: impl Into<String>) -> Self {
        Self {
            outbounds: DashMap::new(),
            default_tag: RwLock::new(default_tag.into()),
        }
    }

    /// Build a dialer from configuration
    ///
    /// A `direct` outbound is always present so the default has something to
    /// fall back on.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let default_tag = config
            .default_proxy
            .clone()
            .unwrap_or_else(|| DEFAULT_DIRECT_TAG.to_string());
        let dialer = Self::new(default_tag);

        dialer.add(Arc::new(DirectOutbound::new(DEFAULT_DIRECT_TAG)));
        for proxy in &config.proxies {
            let outbound: Arc<dyn Outbound> = match proxy {
                ProxyConfig::Direct { tag } => Arc::new(DirectOutbound::new(tag.clone())),
                ProxyConfig::Socks5 {
                    tag,
                    server,
                    username,
                    password,
                } => Arc::new(Socks5Outbound::new(Socks5Config {
                    tag: tag.clone(),
                    server: *server,
                    username: username.clone(),
                    password: password.clone(),
                })),
            };
            dialer.add(outbound);
        }
        dialer
    }

    /// Add an outbound, replacing any outbound with the same tag
    pub fn add(&self, outbound: Arc<dyn Outbound>) {
        let tag = outbound.tag().to_string();
        info!(
            "Adding outbound: {} (type: {})",
            tag,
            outbound.outbound_type()
        );
        self.outbounds.insert(tag, outbound);
    }

    /// Remove an outbound by tag
    pub fn remove(&self, tag: &str) -> Option<Arc<dyn Outbound>> {
        info!("Removing outbound: {}", tag);
        self.outbounds.remove(tag).map(|(_, v)| v)
    }

    /// Get an outbound by tag, resolving the empty tag to the default
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<dyn Outbound>> {
        let resolved = self.resolve_tag(tag);
        self.outbounds.get(&resolved).map(|r| Arc::clone(r.value()))
    }

    /// Check if an outbound exists
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.outbounds.contains_key(tag)
    }

    /// Get all outbound tags
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.outbounds.iter().map(|r| r.key().clone()).collect()
    }

    /// Get the number of registered outbounds
    #[must_use]
    pub fn len(&self) -> usize {
        self.outbounds.len()
    }

    /// Check if no outbounds are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outbounds.is_empty()
    }

    /// Get the default tag
    #[must_use]
    pub fn default_tag(&self) -> String {
        self.default_tag.read().clone()
    }

    /// Change the default tag
    pub fn set_default_tag(&self, tag: impl Into<String>) {
        *self.default_tag.write() = tag.into();
    }

    fn resolve_tag(&self, tag: &str) -> String {
        if tag.is_empty() {
            self.default_tag()
        } else {
            tag.to_string()
        }
    }
}

impl Default for ProxyDialer {
    fn default() -> Self {
        let dialer = Self::new(DEFAULT_DIRECT_TAG);
        dialer.add(Arc::new(DirectOutbound::new(DEFAULT_DIRECT_TAG)));
        dialer
    }
}

#[async_trait]
impl Dialer for ProxyDialer {
    async fn dial(&self, proxy: &str, target: &str) -> Result<RemoteConn, DialError> {
        let target: TargetAddr = target.parse()?;
        let outbound = self
            .get(proxy)
            .ok_or_else(|| DialError::proxy_not_found(self.resolve_tag(proxy)))?;

        debug!(proxy, outbound = outbound.tag(), %target, "dialing");
        outbound.connect(&target).await
    }
}
