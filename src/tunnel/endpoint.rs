//! Virtual network stack endpoint interface
//!
//! The user-space TCP/IP stack terminates intercepted connections and hands
//! each accepted connection to the relay as a [`VirtualEndpoint`]. Reads and
//! writes are non-blocking: when nothing can be done right now the endpoint
//! returns [`EndpointError::WouldBlock`] and the caller waits on the
//! matching readiness [`Notify`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Notify;

/// Readiness a caller can wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    /// Data is available to read
    Readable,
    /// Send buffer space is available
    Writable,
}

/// Errors reported by a virtual endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// Nothing can be done right now; wait for readiness and retry
    #[error("operation would block")]
    WouldBlock,

    /// The send side has been shut down
    #[error("endpoint is closed for send")]
    ClosedForSend,

    /// The receive side has been shut down (peer sent FIN)
    #[error("endpoint is closed for receive")]
    ClosedForReceive,

    /// The peer reset the connection
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The stack aborted the connection
    #[error("connection aborted")]
    ConnectionAborted,

    /// The endpoint is closed
    #[error("endpoint is closed")]
    Closed,

    /// Any other stack error
    #[error("{0}")]
    Other(String),
}

impl EndpointError {
    /// One direction has been shut down; the relay loop for that
    /// direction ends without tearing the tunnel down
    #[must_use]
    pub const fn is_half_closed(&self) -> bool {
        matches!(self, Self::ClosedForSend | Self::ClosedForReceive)
    }

    /// The connection is gone; the tunnel closes without a reason
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::ConnectionReset | Self::ConnectionAborted | Self::Closed
        )
    }
}

/// One accepted TCP connection inside the virtual network stack
///
/// Implementations must signal the `Notify` returned by [`readiness`] with
/// `notify_one` whenever the corresponding condition may have changed
/// (including on close), so a waiter registered after the event still wakes.
///
/// [`readiness`]: VirtualEndpoint::readiness
pub trait VirtualEndpoint: Send + Sync {
    /// Read whatever data is available
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::WouldBlock` when no data is available yet.
    fn read(&self) -> Result<Bytes, EndpointError>;

    /// Write as much of `buf` as fits, returning the number of bytes taken
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::WouldBlock` when the send buffer is full.
    fn write(&self, buf: &[u8]) -> Result<usize, EndpointError>;

    /// Close the endpoint
    fn close(&self);

    /// Local address of the endpoint (the original destination of the
    /// intercepted connection)
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint has no bound address.
    fn local_addr(&self) -> Result<SocketAddr, EndpointError>;

    /// Notification handle for the given readiness
    fn readiness(&self, interest: Interest) -> Arc<Notify>;
}
