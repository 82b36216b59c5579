//! Direct outbound implementation
//!
//! Connects straight to the target. Hostnames are resolved locally by the
//! system resolver.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::traits::{Outbound, RemoteConn, TargetAddr};
use crate::error::DialError;

/// Direct outbound - connects directly to the destination
#[derive(Debug, Clone)]
pub struct DirectOutbound {
    tag: String,
}

impl DirectOutbound {
    /// Create a direct outbound
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

#[async_trait]
impl Outbound for DirectOutbound {
    async fn connect(&self, target: &TargetAddr) -> Result<RemoteConn, DialError> {
        trace!(tag = %self.tag, %target, "direct connect");

        let stream = match target {
            TargetAddr::Ip(addr) => TcpStream::connect(addr).await,
            TargetAddr::Domain(host, port) => TcpStream::connect((host.as_str(), *port)).await,
        }
        .map_err(|e| DialError::connection_failed(target.to_string(), e.to_string()))?;

        // Disable Nagle's algorithm for lower latency
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        debug!(tag = %self.tag, %target, "direct connection established");
        Ok(Box::new(stream))
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn outbound_type(&self) -> &'static str {
        "direct"
    }
}
