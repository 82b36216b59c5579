//! Outbound module
//!
//! This module provides the proxy layer the tunnel dials through.
//!
//! # Outbound Types
//!
//! - `DirectOutbound`: Connect directly to the destination.
//! - `Socks5Outbound`: Connect through a SOCKS5 server, sending hostnames
//!   for the server to resolve.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tunrelay::outbound::{Dialer, ProxyDialer, Socks5Config, Socks5Outbound};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dialer = ProxyDialer::default();
//! dialer.add(Arc::new(Socks5Outbound::new(Socks5Config::new(
//!     "proxy",
//!     "127.0.0.1:1080".parse()?,
//! ))));
//!
//! let conn = dialer.dial("proxy", "example.com:443").await?;
//! println!("Connected via {}", conn.peer_addr()?);
//! # Ok(())
//! # }
//! ```

mod direct;
mod manager;
mod socks5;
mod traits;

pub use direct::DirectOutbound;
pub use manager::{ProxyDialer, DEFAULT_DIRECT_TAG};
pub use socks5::{Socks5Config, Socks5Error, Socks5Outbound};
pub use traits::{Dialer, Outbound, RemoteConn, RemoteStream, TargetAddr};
