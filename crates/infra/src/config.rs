//! Runtime configuration for the stock services.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RECENT_WINDOW_DAYS_ENV: &str = "STOCK_RECENT_WINDOW_DAYS";
pub const MAX_WRITE_RETRIES_ENV: &str = "STOCK_MAX_WRITE_RETRIES";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected} (got '{value}')")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockConfig {
    /// Targets at most this many days old are reconstructed backward from the
    /// live balance; older ones start from a snapshot.
    pub recent_window_days: i64,
    /// Conditional balance writes retried this many times before giving up
    /// with a conflict.
    pub max_write_retries: u32,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 7,
            max_write_retries: 5,
        }
    }
}

impl StockConfig {
    pub fn with_recent_window_days(mut self, days: i64) -> Self {
        self.recent_window_days = days;
        self
    }

    pub fn with_max_write_retries(mut self, retries: u32) -> Self {
        self.max_write_retries = retries;
        self
    }

    /// Defaults overridden by `STOCK_RECENT_WINDOW_DAYS` / `STOCK_MAX_WRITE_RETRIES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(raw) = lookup(RECENT_WINDOW_DAYS_ENV) {
            cfg.recent_window_days = raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|days| *days >= 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: RECENT_WINDOW_DAYS_ENV,
                    expected: "a non-negative integer",
                    value: raw.clone(),
                })?;
        }

        if let Some(raw) = lookup(MAX_WRITE_RETRIES_ENV) {
            cfg.max_write_retries = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|retries| *retries >= 1)
                .ok_or_else(|| ConfigError::Invalid {
                    key: MAX_WRITE_RETRIES_ENV,
                    expected: "a positive integer",
                    value: raw.clone(),
                })?;
        }

        Ok(cfg)
    }
}
