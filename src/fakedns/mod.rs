//! FakeDNS - domain hijacking for transparent proxying
//!
//! DNS answers for hijacked domains are replaced with synthetic addresses
//! drawn from a reserved subnet. When the client later connects to one of
//! those addresses, the tunnel looks the address up again to recover the
//! hostname and routing tag, so the proxy can be dialed by name.
//!
//! ## Features
//!
//! - **Bijective mapping**: Domain -> IP and IP -> Domain lookups
//! - **Sliding TTL**: Every hit pushes a record's expiry forward
//! - **Threshold-gated reaper**: Small tables are never swept
//! - **Proxy bypass set**: Domains resolved directly, with their own TTL
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tunrelay::fakedns::{FakeDnsConfig, HijackTable};
//!
//! let config = FakeDnsConfig::default();
//! let table = Arc::new(HijackTable::from_config(&config));
//! let shutdown = CancellationToken::new();
//! let reaper = table.spawn_reaper(config.cleanup_interval(), shutdown.clone());
//!
//! let record = table.set("example.com", "socks").unwrap();
//! assert_eq!(table.get_by_ip(record.ip).unwrap().hostname, "example.com");
//! ```

pub mod config;
pub mod pool;
pub mod processor;
pub mod record;
pub mod table;

// Re-export main types for convenience
pub use config::FakeDnsConfig;
pub use pool::Ipv4Pool;
pub use processor::{handle_dns_request, hijack_wire_query};
pub use record::{DomainRecord, BLOCK_PROXY};
pub use table::{eviction_threshold, HijackStats, HijackStatsSnapshot, HijackTable};
