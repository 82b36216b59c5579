//! tunrelay: FakeDNS hijacking and TCP relay core for transparent proxying
//!
//! This crate sits between a user-space TCP/IP stack that terminates
//! intercepted connections and an upstream proxy.
//!
//! # Features
//!
//! - **FakeDNS**: A queries are answered with synthetic addresses, so
//!   connections can later be mapped back to the hostname they were for
//! - **Sliding TTL**: Hijack records stay alive while in use and are reaped
//!   once the table grows past its threshold
//! - **TCP Relay**: Per-connection bidirectional relay with half-close,
//!   idle timeout and exactly-once teardown
//! - **Proxy Dialing**: Direct and SOCKS5 outbounds selected by routing tag
//!
//! # Architecture
//!
//! ```text
//! DNS query → HijackTable::set → synthetic A answer
//!
//! Client → virtual stack → TcpHandler → TcpTunnel → ProxyDialer → Destination
//!                                  ↓
//!                      HijackTable::get_by_ip (hostname, tag)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tunrelay::config::load_config;
//! use tunrelay::fakedns::HijackTable;
//! use tunrelay::outbound::ProxyDialer;
//! use tunrelay::tunnel::TcpHandler;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("/etc/tunrelay/config.json")?;
//! tunrelay::logging::init_logging(&config.log);
//!
//! let table = Arc::new(HijackTable::from_config(&config.fakedns));
//! let shutdown = CancellationToken::new();
//! table.spawn_reaper(config.fakedns.cleanup_interval(), shutdown.clone());
//!
//! let dialer = Arc::new(ProxyDialer::from_config(&config));
//! let handler = TcpHandler::new(Some(table), dialer, config.tcp.clone());
//!
//! // Feed accept events from the virtual stack into `handler.handle(..)`
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types and loading
//! - [`error`]: Error types
//! - [`fakedns`]: Hijack table, address pool and DNS processing
//! - [`logging`]: Subscriber setup
//! - [`outbound`]: Proxy dialer and outbound implementations
//! - [`tunnel`]: Virtual endpoint interface and TCP relay

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod fakedns;
pub mod logging;
pub mod outbound;
pub mod tunnel;

// Re-export commonly used types at the crate root
pub use config::{Config, TcpConfig};
pub use error::{ConfigError, DialError, HijackError, TunnelError, TunrelayError};
pub use fakedns::{DomainRecord, FakeDnsConfig, HijackTable};
pub use outbound::{Dialer, ProxyDialer, RemoteConn, RemoteStream};
pub use tunnel::{EndpointError, Interest, TcpHandler, TcpTunnel, TunnelStatus, VirtualEndpoint};
