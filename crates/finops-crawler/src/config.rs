//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::engine::{DEFAULT_POLL_DELAY, DEFAULT_RATE_LIMIT_DELAY};
use crate::CostProviderError;

/// Default number of scopes retrieved at once.
pub const DEFAULT_CONCURRENCY: usize = 1;

pub const ENV_RATE_LIMIT_DELAY: &str = "FINOPS_RATE_LIMIT_DELAY_SECS";
pub const ENV_RATE_LIMIT_MAX_RETRIES: &str = "FINOPS_RATE_LIMIT_MAX_RETRIES";
pub const ENV_POLL_DELAY: &str = "FINOPS_POLL_DELAY_SECS";
pub const ENV_CONCURRENCY: &str = "FINOPS_CONCURRENCY";

/// Tuning knobs for a retrieval session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Wait between rate-limited attempts.
    pub rate_limit_delay: Duration,
    /// Ceiling on rate-limit retries. `None` retries forever.
    pub max_rate_limit_retries: Option<u32>,
    /// Poll delay when the server suggests none.
    pub default_poll_delay: Duration,
    /// Scopes retrieved concurrently.
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            max_rate_limit_retries: None,
            default_poll_delay: DEFAULT_POLL_DELAY,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `FINOPS_RATE_LIMIT_DELAY_SECS`: delay after a rate limit (default: 10)
    /// - `FINOPS_RATE_LIMIT_MAX_RETRIES`: retry ceiling (default: unbounded)
    /// - `FINOPS_POLL_DELAY_SECS`: fallback report poll delay (default: 5)
    /// - `FINOPS_CONCURRENCY`: scopes fetched at once (default: 1)
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Config`] if a variable is set but not a
    /// valid number.
    pub fn from_env() -> Result<Self, CostProviderError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an explicit variable source.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Config`] on unparseable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CostProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let rate_limit_delay = parse::<u64>(&lookup, ENV_RATE_LIMIT_DELAY)?
            .map_or(defaults.rate_limit_delay, Duration::from_secs);
        let max_rate_limit_retries = parse::<u32>(&lookup, ENV_RATE_LIMIT_MAX_RETRIES)?;
        let default_poll_delay = parse::<u64>(&lookup, ENV_POLL_DELAY)?
            .map_or(defaults.default_poll_delay, Duration::from_secs);
        let concurrency = parse::<usize>(&lookup, ENV_CONCURRENCY)?.unwrap_or(defaults.concurrency);

        if concurrency == 0 {
            return Err(CostProviderError::Config(format!(
                "{ENV_CONCURRENCY} must be at least 1"
            )));
        }

        Ok(Self {
            rate_limit_delay,
            max_rate_limit_retries,
            default_poll_delay,
            concurrency,
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, CostProviderError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| {
            CostProviderError::Config(format!("{key} must be a non-negative integer, got '{value}'"))
        }),
    }
}
