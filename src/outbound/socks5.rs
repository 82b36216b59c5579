//! SOCKS5 outbound implementation
//!
//! This module provides a SOCKS5 client outbound (RFC 1928) with optional
//! username/password authentication (RFC 1929).
//!
//! Hostname targets are sent as `ATYP_DOMAIN` so the proxy resolves them.
//! This is what makes hijacked domains useful: the synthetic address never
//! leaves the local host.
//!
//! # Example
//!
//! ```no_run
//! use tunrelay::outbound::{Outbound, Socks5Config, Socks5Outbound, TargetAddr};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Socks5Config::new("proxy", "127.0.0.1:1080".parse()?)
//!     .with_auth("user", "pass");
//! let outbound = Socks5Outbound::new(config);
//!
//! let target: TargetAddr = "example.com:443".parse()?;
//! let conn = outbound.connect(&target).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::traits::{Outbound, RemoteConn, TargetAddr};
use crate::error::DialError;

// ============================================================================
// Wire Constants (RFC 1928 / RFC 1929)
// ============================================================================

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_METHOD_NONE: u8 = 0x00;
const AUTH_METHOD_PASSWORD: u8 = 0x02;
const AUTH_METHOD_NO_ACCEPTABLE: u8 = 0xFF;
const AUTH_PASSWORD_VERSION: u8 = 0x01;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REPLY_SUCCEEDED: u8 = 0x00;

/// Text for a CONNECT reply code
const fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// SOCKS5 specific errors
#[derive(Debug, Error)]
pub enum Socks5Error {
    /// Invalid protocol version
    #[error("Invalid SOCKS version: expected {expected}, got {actual}")]
    InvalidVersion { expected: u8, actual: u8 },

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Authentication failed
    #[error("SOCKS5 authentication failed")]
    AuthFailed,

    /// Server returned error reply
    #[error("SOCKS5 server error (code {code:#04x}): {message}")]
    ServerReply { code: u8, message: &'static str },

    /// Invalid address type
    #[error("Invalid address type: {0:#04x}")]
    InvalidAddressType(u8),

    /// Protocol error (malformed message)
    #[error("SOCKS5 protocol error: {0}")]
    ProtocolError(String),

    /// Connection error
    #[error("SOCKS5 connection error: {0}")]
    ConnectionError(String),
}

impl From<Socks5Error> for DialError {
    fn from(e: Socks5Error) -> Self {
        DialError::Socks5(e.to_string())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for SOCKS5 outbound
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Socks5Config {
    /// Unique tag for this outbound
    pub tag: String,
    /// SOCKS5 server address
    pub server: SocketAddr,
    /// Username for authentication (optional)
    #[serde(default)]
    pub username: Option<String>,
    /// Password for authentication (optional)
    #[serde(default)]
    pub password: Option<String>,
}

impl Socks5Config {
    /// Create a new SOCKS5 config
    pub fn new(tag: impl Into<String>, server: SocketAddr) -> Self {
        Self {
            tag: tag.into(),
            server,
            username: None,
            password: None,
        }
    }

    /// Set authentication credentials
    #[must_use]
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Check if authentication is configured
    #[must_use]
    pub fn has_auth(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    fn auth(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

// ============================================================================
// Client Handshake
// ============================================================================

fn io_error(stage: &'static str) -> impl FnOnce(io::Error) -> Socks5Error {
    move |e| Socks5Error::ConnectionError(format!("{stage}: {e}"))
}

fn check_version(actual: u8) -> Result<(), Socks5Error> {
    if actual == SOCKS5_VERSION {
        Ok(())
    } else {
        Err(Socks5Error::InvalidVersion {
            expected: SOCKS5_VERSION,
            actual,
        })
    }
}

/// Method negotiation, plus RFC 1929 sub-negotiation if the server asks for it
async fn negotiate<S>(stream: &mut S, auth: Option<(&str, &str)>) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting: &[u8] = match auth {
        Some(_) => &[SOCKS5_VERSION, 2, AUTH_METHOD_NONE, AUTH_METHOD_PASSWORD],
        None => &[SOCKS5_VERSION, 1, AUTH_METHOD_NONE],
    };
    stream.write_all(greeting).await.map_err(io_error("send greeting"))?;

    let mut choice = [0u8; 2];
    stream
        .read_exact(&mut choice)
        .await
        .map_err(io_error("read method choice"))?;
    check_version(choice[0])?;
    trace!(method = choice[1], "socks5 method selected");

    match (choice[1], auth) {
        (AUTH_METHOD_NONE, _) => Ok(()),
        (AUTH_METHOD_PASSWORD, Some((username, password))) => {
            send_credentials(stream, username, password).await
        }
        (AUTH_METHOD_PASSWORD, None) => Err(Socks5Error::AuthFailed),
        (AUTH_METHOD_NO_ACCEPTABLE, _) => Err(Socks5Error::NoAcceptableMethod),
        (other, _) => Err(Socks5Error::ProtocolError(format!(
            "unsupported auth method: {other:#04x}"
        ))),
    }
}

async fn send_credentials<S>(stream: &mut S, username: &str, password: &str) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = BytesMut::with_capacity(3 + username.len() + password.len());
    frame.put_u8(AUTH_PASSWORD_VERSION);
    put_short_string(&mut frame, username, "username")?;
    put_short_string(&mut frame, password, "password")?;
    stream.write_all(&frame).await.map_err(io_error("send credentials"))?;

    let mut status = [0u8; 2];
    stream
        .read_exact(&mut status)
        .await
        .map_err(io_error("read auth status"))?;
    if status[0] != AUTH_PASSWORD_VERSION {
        return Err(Socks5Error::ProtocolError(format!(
            "invalid auth version: {:#04x}",
            status[0]
        )));
    }
    if status[1] != 0 {
        return Err(Socks5Error::AuthFailed);
    }
    Ok(())
}

/// Length-prefixed field of at most 255 bytes
fn put_short_string(frame: &mut BytesMut, value: &str, what: &str) -> Result<(), Socks5Error> {
    let len = u8::try_from(value.len()).map_err(|_| {
        Socks5Error::ProtocolError(format!("{what} too long: {} bytes", value.len()))
    })?;
    frame.put_u8(len);
    frame.put_slice(value.as_bytes());
    Ok(())
}

/// Encode a CONNECT request; hostnames go out as `ATYP_DOMAIN`
fn build_connect_request(target: &TargetAddr) -> Result<BytesMut, Socks5Error> {
    let mut request = BytesMut::with_capacity(7 + target.host().len());
    request.put_slice(&[SOCKS5_VERSION, CMD_CONNECT, 0x00]);

    match target {
        TargetAddr::Ip(SocketAddr::V4(v4)) => {
            request.put_u8(ATYP_IPV4);
            request.put_slice(&v4.ip().octets());
        }
        TargetAddr::Ip(SocketAddr::V6(v6)) => {
            request.put_u8(ATYP_IPV6);
            request.put_slice(&v6.ip().octets());
        }
        TargetAddr::Domain(host, _) => {
            request.put_u8(ATYP_DOMAIN);
            put_short_string(&mut request, host, "domain")?;
        }
    }

    request.put_u16(target.port());
    Ok(request)
}

/// Read the CONNECT reply and return the server's bound address
///
/// A bound hostname is consumed but reported as `0.0.0.0`.
async fn read_connect_reply<S>(stream: &mut S) -> Result<SocketAddr, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let mut head = [0u8; 4];
    stream
        .read_exact(&mut head)
        .await
        .map_err(io_error("read reply"))?;
    check_version(head[0])?;
    if head[1] != REPLY_SUCCEEDED {
        return Err(Socks5Error::ServerReply {
            code: head[1],
            message: reply_message(head[1]),
        });
    }

    let ip = match head[3] {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream
                .read_exact(&mut octets)
                .await
                .map_err(io_error("read bound address"))?;
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            stream
                .read_exact(&mut octets)
                .await
                .map_err(io_error("read bound address"))?;
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await.map_err(io_error("read bound address"))?;
            let mut name = vec![0u8; usize::from(len)];
            stream
                .read_exact(&mut name)
                .await
                .map_err(io_error("read bound address"))?;
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
        other => return Err(Socks5Error::InvalidAddressType(other)),
    };
    let port = stream.read_u16().await.map_err(io_error("read bound port"))?;

    Ok(SocketAddr::new(ip, port))
}

/// Run the full client side of a CONNECT over an established stream
async fn connect_over<S>(
    stream: &mut S,
    auth: Option<(&str, &str)>,
    target: &TargetAddr,
) -> Result<SocketAddr, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    negotiate(stream, auth).await?;

    let request = build_connect_request(target)?;
    trace!(%target, "sending socks5 connect");
    stream
        .write_all(&request)
        .await
        .map_err(io_error("send connect"))?;

    read_connect_reply(stream).await
}

// ============================================================================
// SOCKS5 Outbound
// ============================================================================

/// SOCKS5 outbound
///
/// Opens a fresh connection to the proxy server for every dial.
pub struct Socks5Outbound {
    config: Socks5Config,
}

impl Socks5Outbound {
    /// Create a SOCKS5 outbound
    #[must_use]
    pub fn new(config: Socks5Config) -> Self {
        Self { config }
    }

    /// Get the SOCKS5 server address
    #[must_use]
    pub const fn server(&self) -> SocketAddr {
        self.config.server
    }
}

#[async_trait]
impl Outbound for Socks5Outbound {
    async fn connect(&self, target: &TargetAddr) -> Result<RemoteConn, DialError> {
        let mut stream = TcpStream::connect(self.config.server)
            .await
            .map_err(|e| DialError::connection_failed(self.config.server.to_string(), e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for SOCKS5: {}", e);
        }

        let bound = connect_over(&mut stream, self.config.auth(), target).await?;

        debug!(
            "SOCKS5 CONNECT to {} via {} succeeded (bound {})",
            target, self.config.tag, bound
        );
        Ok(Box::new(stream))
    }

    fn tag(&self) -> &str {
        &self.config.tag
    }

    fn outbound_type(&self) -> &'static str {
        "socks5"
    }
}

impl fmt::Debug for Socks5Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socks5Outbound")
            .field("tag", &self.config.tag)
            .field("server", &self.config.server)
            .field("has_auth", &self.config.has_auth())
            .finish()
    }
}
