//! Error types for tunrelay
//!
//! Errors are grouped by subsystem. Each group knows whether a failure is
//! worth retrying, which callers use to decide between dropping a hijack
//! attempt for this cycle and giving up on a connection entirely.

use std::io;

use hickory_proto::rr::RecordType;
use thiserror::Error;

use crate::tunnel::EndpointError;

/// Top-level error type for tunrelay
#[derive(Debug, Error)]
pub enum TunrelayError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// DNS hijack errors
    #[error("Hijack error: {0}")]
    Hijack(#[from] HijackError),

    /// Proxy dialing errors
    #[error("Dial error: {0}")]
    Dial(#[from] DialError),

    /// TCP tunnel errors
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TunrelayError {
    /// Check if this error is recoverable (can retry operation)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Hijack(e) => e.is_recoverable(),
            Self::Dial(e) => e.is_recoverable(),
            Self::Tunnel(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Config errors are generally not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

/// Errors produced while answering a DNS query with a hijacked address
#[derive(Debug, Error)]
pub enum HijackError {
    /// The synthetic address pool has no free address left
    #[error("synthetic address space is used up, domain: {domain}")]
    PoolExhausted { domain: String },

    /// The query carried no question section
    #[error("DNS query has no question")]
    NoQuestion,

    /// Only IN-class A questions are hijacked
    #[error("query type not hijacked: {0}")]
    Unsupported(RecordType),

    /// Wire-format decode failure
    #[error("failed to parse DNS message: {0}")]
    ParseError(String),

    /// Wire-format encode failure
    #[error("failed to encode DNS message: {0}")]
    EncodeError(String),
}

impl HijackError {
    /// Exhaustion clears once the reaper frees addresses; everything else is
    /// a property of the query itself.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(domain: impl Into<String>) -> Self {
        Self::PoolExhausted {
            domain: domain.into(),
        }
    }
}

/// Errors from dialing through the proxy layer
#[derive(Debug, Error)]
pub enum DialError {
    /// No outbound registered under the requested tag
    #[error("Proxy not found: {tag}")]
    ProxyNotFound { tag: String },

    /// The target string is not `host:port`
    #[error("Invalid target address: {0}")]
    InvalidTarget(String),

    /// Connecting to the target (or the proxy server) failed
    #[error("Failed to connect to {target}: {reason}")]
    ConnectionFailed { target: String, reason: String },

    /// The SOCKS5 server refused or broke the handshake
    #[error("SOCKS5 error: {0}")]
    Socks5(String),

    /// I/O error during dialing
    #[error("Dial I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl DialError {
    /// Check if this error is recoverable
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ProxyNotFound { .. } | Self::InvalidTarget(_) => false,
            Self::ConnectionFailed { .. } | Self::Socks5(_) => true,
            Self::IoError(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a proxy not found error
    pub fn proxy_not_found(tag: impl Into<String>) -> Self {
        Self::ProxyNotFound { tag: tag.into() }
    }
}

/// TCP tunnel errors
///
/// `Blocked` and `Dial` surface synchronously from tunnel construction. The
/// I/O variants only ever appear as close reasons inside a running tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The hijack record routes this domain to the reject policy
    #[error("{domain} is blocked")]
    Blocked { domain: String },

    /// Dialing the upstream failed
    #[error("dial {target} by proxy {proxy:?} failed: {source}")]
    Dial {
        target: String,
        proxy: String,
        #[source]
        source: DialError,
    },

    /// Unexpected error on the virtual endpoint side
    #[error("local endpoint {op} failed: {source}")]
    LocalIo {
        op: &'static str,
        #[source]
        source: EndpointError,
    },

    /// Unexpected error on the proxy connection side
    #[error("remote connection {op} failed: {source}")]
    RemoteIo {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TunnelError {
    /// Check if this error is recoverable
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Blocked { .. } | Self::LocalIo { .. } | Self::RemoteIo { .. } => false,
            Self::Dial { source, .. } => source.is_recoverable(),
        }
    }

    /// Create a blocked error
    pub fn blocked(domain: impl Into<String>) -> Self {
        Self::Blocked {
            domain: domain.into(),
        }
    }

    pub(crate) const fn local(op: &'static str, source: EndpointError) -> Self {
        Self::LocalIo { op, source }
    }

    pub(crate) const fn remote(op: &'static str, source: io::Error) -> Self {
        Self::RemoteIo { op, source }
    }
}

/// Type alias for Result with TunrelayError
pub type Result<T> = std::result::Result<T, TunrelayError>;
