//! Logging setup
//!
//! Installs a global `tracing` subscriber from [`LogConfig`]. `RUST_LOG`
//! directives are honored on top of the configured level.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Parse a configured level, falling back to INFO for unknown names
#[must_use]
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the filter for a logging configuration
#[must_use]
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(parse_level(&config.level).into());
    if let Ok(directive) = "tokio=warn".parse() {
        filter = filter.add_directive(directive);
    }
    filter
}

/// Initialize the global subscriber
///
/// Returns `false` if a global subscriber was already installed, which
/// happens when the embedding application set up its own.
pub fn init_logging(config: &LogConfig) -> bool {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_target(config.target);

    if config.format == "json" {
        subscriber.json().try_init().is_ok()
    } else {
        subscriber.try_init().is_ok()
    }
}
