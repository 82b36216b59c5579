//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::Config;
use crate::error::ConfigError;

/// Environment variable overriding the log level
pub const ENV_LOG_LEVEL: &str = "TUNRELAY_LOG_LEVEL";

/// Environment variable overriding the TCP idle timeout (seconds)
pub const ENV_TCP_IDLE_TIMEOUT: &str = "TUNRELAY_TCP_IDLE_TIMEOUT";

/// Environment variable overriding the hijack record TTL (seconds)
pub const ENV_FAKEDNS_TTL: &str = "TUNRELAY_FAKEDNS_TTL";

/// Load configuration from a JSON file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        "Configuration loaded: {} proxies, fakedns network={}",
        config.proxies.len(),
        config.fakedns.network
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `TUNRELAY_LOG_LEVEL`: Override log level
/// - `TUNRELAY_TCP_IDLE_TIMEOUT`: Override TCP idle timeout in seconds
/// - `TUNRELAY_FAKEDNS_TTL`: Override hijack record TTL in seconds
///
/// # Errors
///
/// Returns `ConfigError` if loading or parsing fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

/// Apply overrides from `lookup` and re-validate
pub(crate) fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.log.level = level;
        debug!("Log level overridden to {}", config.log.level);
    }

    if let Some(secs) = lookup(ENV_TCP_IDLE_TIMEOUT) {
        config.tcp.idle_timeout_secs = parse_secs(ENV_TCP_IDLE_TIMEOUT, &secs)?;
        debug!(
            "TCP idle timeout overridden to {}s",
            config.tcp.idle_timeout_secs
        );
    }

    if let Some(secs) = lookup(ENV_FAKEDNS_TTL) {
        config.fakedns.ttl_secs = parse_secs(ENV_FAKEDNS_TTL, &secs)?;
        debug!("FakeDNS TTL overridden to {}s", config.fakedns.ttl_secs);
    }

    // Re-validate after overrides
    config.validate()
}

fn parse_secs(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::EnvError {
        name: name.into(),
        reason: format!("Invalid number of seconds: {value}"),
    })
}
