//! Configuration module for tunrelay
//!
//! This module provides configuration types and loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use tunrelay::config::load_config;
//!
//! let config = load_config("/etc/tunrelay/config.json").unwrap();
//! println!("FakeDNS network: {}", config.fakedns.network);
//! ```

mod loader;
mod types;

pub use loader::{
    load_config, load_config_str, load_config_with_env, ENV_FAKEDNS_TTL, ENV_LOG_LEVEL,
    ENV_TCP_IDLE_TIMEOUT,
};
pub use types::{Config, LogConfig, ProxyConfig, TcpConfig};
