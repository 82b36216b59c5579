//! Outbound trait definitions
//!
//! This module defines the seams between the tunnel and the proxy layer:
//! `Dialer` (what the tunnel calls), `Outbound` (one way of reaching a
//! target) and `RemoteStream` (what comes back).

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::DialError;

/// Idle time before the first keep-alive packet
pub const KEEPALIVE_TIME: Duration = Duration::from_secs(60);

/// Interval between keep-alive packets
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// An established connection to the target, possibly through a proxy
pub trait RemoteStream: AsyncRead + AsyncWrite + Send + Unpin {
    /// Local address of the underlying socket
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Address of the peer the socket is connected to (the proxy server
    /// for proxied connections)
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Enable or disable TCP keep-alive packets
    fn set_keepalive(&self, enabled: bool) -> io::Result<()>;
}

impl RemoteStream for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_keepalive(&self, enabled: bool) -> io::Result<()> {
        let sock = SockRef::from(self);
        if enabled {
            let keepalive = TcpKeepalive::new()
                .with_time(KEEPALIVE_TIME)
                .with_interval(KEEPALIVE_INTERVAL);
            sock.set_tcp_keepalive(&keepalive)
        } else {
            sock.set_keepalive(false)
        }
    }
}

/// Boxed remote connection handed to the tunnel
pub type RemoteConn = Box<dyn RemoteStream>;

/// Dial a target through the proxy identified by a routing tag
///
/// `target` is `host:port`, where host is a hostname or an IP literal.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a connection to `target` through `proxy`
    ///
    /// # Errors
    ///
    /// Returns `DialError` if the proxy is unknown or the connection fails.
    async fn dial(&self, proxy: &str, target: &str) -> Result<RemoteConn, DialError>;
}

/// One way of reaching a target
///
/// All outbound types (Direct, SOCKS5) implement this trait.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Connect to the target through this outbound
    ///
    /// # Errors
    ///
    /// Returns `DialError` if the connection fails.
    async fn connect(&self, target: &TargetAddr) -> Result<RemoteConn, DialError>;

    /// Get the unique tag for this outbound
    fn tag(&self) -> &str;

    /// Get the outbound type name
    fn outbound_type(&self) -> &'static str;
}

/// Dial target: an IP endpoint or a hostname left for the proxy to resolve
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    /// IP address and port
    Ip(SocketAddr),
    /// Hostname and port
    Domain(String, u16),
}

impl TargetAddr {
    /// Get the port
    #[must_use]
    pub const fn port(&self) -> u16 {
        match self {
            Self::Ip(addr) => addr.port(),
            Self::Domain(_, port) => *port,
        }
    }

    /// Get the host part as written in the target string
    #[must_use]
    pub fn host(&self) -> String {
        match self {
            Self::Ip(addr) => addr.ip().to_string(),
            Self::Domain(host, _) => host.clone(),
        }
    }
}

impl FromStr for TargetAddr {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::Ip(addr));
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DialError::InvalidTarget(s.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| DialError::InvalidTarget(s.to_string()))?;

        if host.is_empty() || host.contains(':') {
            return Err(DialError::InvalidTarget(s.to_string()));
        }

        match host.parse::<IpAddr>() {
            Ok(ip) => Ok(Self::Ip(SocketAddr::new(ip, port))),
            Err(_) => Ok(Self::Domain(host.to_string(), port)),
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(addr) => write!(f, "{addr}"),
            Self::Domain(host, port) => write!(f, "{host}:{port}"),
        }
    }
}
