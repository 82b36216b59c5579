//! TCP tunnel module
//!
//! Relays connections accepted by a user-space TCP/IP stack to the proxy
//! layer.
//!
//! - [`VirtualEndpoint`]: the stack's side of one accepted connection
//! - [`TcpTunnel`]: per-connection relay state machine
//! - [`TcpHandler`]: accept event to running tunnel, with statistics

mod endpoint;
mod handler;
mod stats;
mod status;
mod tcp;

pub use endpoint::{EndpointError, Interest, VirtualEndpoint};
pub use handler::TcpHandler;
pub use stats::{TunnelStats, TunnelStatsSnapshot};
pub use status::{StatusCell, TunnelStatus};
pub use tcp::{RelayStats, TcpTunnel};
