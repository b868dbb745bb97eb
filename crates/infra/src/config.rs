//! Configuration loading and representation.
//!
//! Everything comes from environment variables with defaults suitable for
//! local development (in-memory stores, sequential ids).

use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// How new item ids are generated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IdStrategy {
    Sequential,
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub listen_addr: String,
    pub lock_timeout: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub id_strategy: IdStrategy,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            lock_timeout: Duration::from_millis(2000),
            default_page_size: 20,
            max_page_size: 100,
            rate_limit: 120,
            rate_window: Duration::from_secs(60),
            id_strategy: IdStrategy::Sequential,
            use_persistent_stores: false,
            database_url: None,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup (tests pass a map instead of the process env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let listen_addr = lookup("LOOMLEDGER_LISTEN_ADDR").unwrap_or(defaults.listen_addr);
        let lock_timeout = Duration::from_millis(parse_or(
            &lookup,
            "LOOMLEDGER_LOCK_TIMEOUT_MS",
            defaults.lock_timeout.as_millis() as u64,
        )?);
        let default_page_size = parse_or(&lookup, "LOOMLEDGER_DEFAULT_PAGE_SIZE", defaults.default_page_size)?;
        let max_page_size = parse_or(&lookup, "LOOMLEDGER_MAX_PAGE_SIZE", defaults.max_page_size)?;
        let rate_limit = parse_or(&lookup, "LOOMLEDGER_RATE_LIMIT", defaults.rate_limit)?;
        let rate_window = Duration::from_secs(parse_or(
            &lookup,
            "LOOMLEDGER_RATE_WINDOW_SECS",
            defaults.rate_window.as_secs(),
        )?);

        let id_strategy = match lookup("LOOMLEDGER_ID_STRATEGY").as_deref().map(str::trim) {
            None | Some("") | Some("sequential") => IdStrategy::Sequential,
            Some("uuid") => IdStrategy::Uuid,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOOMLEDGER_ID_STRATEGY",
                    message: format!("expected 'sequential' or 'uuid', got '{other}'"),
                });
            }
        };

        let use_persistent_stores = parse_or(&lookup, "USE_PERSISTENT_STORES", false)?;
        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        if lock_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "LOOMLEDGER_LOCK_TIMEOUT_MS",
                message: "must be greater than zero".to_string(),
            });
        }
        if max_page_size == 0 || default_page_size == 0 || default_page_size > max_page_size {
            return Err(ConfigError::Invalid {
                key: "LOOMLEDGER_DEFAULT_PAGE_SIZE",
                message: format!(
                    "page sizes must be positive with default ({default_page_size}) <= max ({max_page_size})"
                ),
            });
        }

        Ok(Self {
            listen_addr,
            lock_timeout,
            default_page_size,
            max_page_size,
            rate_limit,
            rate_window,
            id_strategy,
            use_persistent_stores,
            database_url,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            lock_timeout: self.lock_timeout,
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
    }
}
