use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::CoreError;

pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONCURRENT_PORTFOLIOS: usize = 8;
pub const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Runtime configuration for the tracker and its snapshot scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Seconds between scheduler ticks.
    pub snapshot_interval_secs: u64,

    /// Currency snapshots are valued in (3-letter code, uppercase).
    pub currency: String,

    /// Upper bound on a single portfolio's price fetch.
    pub fetch_timeout_secs: u64,

    /// How many portfolios are processed at the same time within a tick.
    pub max_concurrent_portfolios: usize,

    pub coingecko_base_url: String,

    /// Optional CoinGecko demo API key.
    pub coingecko_api_key: Option<String>,

    /// Where the file store lives. `None` keeps everything in memory.
    pub store_path: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            currency: "USD".to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_concurrent_portfolios: DEFAULT_MAX_CONCURRENT_PORTFOLIOS,
            coingecko_base_url: DEFAULT_COINGECKO_BASE_URL.to_string(),
            coingecko_api_key: None,
            store_path: None,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables:
    /// - `PORTFOLIO_SNAPSHOT_INTERVAL_SECS`: seconds between snapshot ticks
    /// - `PORTFOLIO_CURRENCY`: valuation currency (e.g., `USD`)
    /// - `PORTFOLIO_FETCH_TIMEOUT_SECS`: per-portfolio price fetch timeout
    /// - `PORTFOLIO_MAX_CONCURRENCY`: portfolios processed concurrently per tick
    /// - `COINGECKO_BASE_URL`: market data API root
    /// - `COINGECKO_API_KEY`: optional demo API key
    /// - `PORTFOLIO_STORE_PATH`: file store location (unset = in-memory)
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, but reads values through `lookup`.
    /// Missing or empty values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            snapshot_interval_secs: parse_or(
                get("PORTFOLIO_SNAPSHOT_INTERVAL_SECS"),
                "PORTFOLIO_SNAPSHOT_INTERVAL_SECS",
                defaults.snapshot_interval_secs,
            )?,
            currency: get("PORTFOLIO_CURRENCY").unwrap_or(defaults.currency),
            fetch_timeout_secs: parse_or(
                get("PORTFOLIO_FETCH_TIMEOUT_SECS"),
                "PORTFOLIO_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout_secs,
            )?,
            max_concurrent_portfolios: parse_or(
                get("PORTFOLIO_MAX_CONCURRENCY"),
                "PORTFOLIO_MAX_CONCURRENCY",
                defaults.max_concurrent_portfolios,
            )?,
            coingecko_base_url: get("COINGECKO_BASE_URL").unwrap_or(defaults.coingecko_base_url),
            coingecko_api_key: get("COINGECKO_API_KEY"),
            store_path: get("PORTFOLIO_STORE_PATH").map(PathBuf::from),
        };

        config.validated()
    }

    /// Check value ranges and normalize the currency code.
    pub fn validated(mut self) -> Result<Self, CoreError> {
        let currency = self.currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::Config(format!(
                "Invalid currency code '{}': must be exactly 3 ASCII letters (e.g., USD, EUR)",
                self.currency
            )));
        }
        self.currency = currency;

        if self.snapshot_interval_secs == 0 {
            return Err(CoreError::Config(
                "snapshot interval must be at least 1 second".into(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(CoreError::Config(
                "fetch timeout must be at least 1 second".into(),
            ));
        }
        if self.max_concurrent_portfolios == 0 {
            return Err(CoreError::Config(
                "max concurrent portfolios must be at least 1".into(),
            ));
        }
        Ok(self)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CoreError::Config(format!("{key}='{raw}': {e}"))),
        None => Ok(default),
    }
}
