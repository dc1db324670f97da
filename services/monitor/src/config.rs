//! Service configuration from the environment
//!
//! Keys: `LEDGER_URL`, `LEDGER_SERVICE_KEY`, `FEED_URL`, `PORT`,
//! `MONITOR_INTERVAL_MS`, `PRICE_STALE_MS`. The first three are required;
//! the rest carry defaults.

use std::env;
use thiserror::Error;

/// Default port for the health endpoint.
pub const DEFAULT_PORT: u16 = 3001;
/// Default tick period in milliseconds.
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1_000;
/// Default price staleness threshold in milliseconds.
pub const DEFAULT_PRICE_STALE_MS: i64 = 30_000;

/// Errors raised while reading the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration for the monitor service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the ledger service.
    pub ledger_url: String,
    /// Server-side credentials for the atomic RPC surface.
    pub ledger_service_key: String,
    /// Base URL of the exchange book-ticker stream.
    pub feed_url: String,
    /// Port for the health endpoint.
    pub port: u16,
    /// Tick period.
    pub monitor_interval_ms: u64,
    /// Staleness threshold for price ticks.
    pub price_stale_ms: i64,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ledger_url: required("LEDGER_URL")?,
            ledger_service_key: required("LEDGER_SERVICE_KEY")?,
            feed_url: required("FEED_URL")?,
            port: parsed_or("PORT", DEFAULT_PORT)?,
            monitor_interval_ms: parsed_or("MONITOR_INTERVAL_MS", DEFAULT_MONITOR_INTERVAL_MS)?,
            price_stale_ms: parsed_or("PRICE_STALE_MS", DEFAULT_PRICE_STALE_MS)?,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|_| ConfigError::Invalid {
                key,
                value,
            })
        }
        _ => Ok(default),
    }
}
