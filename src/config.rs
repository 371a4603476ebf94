//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all application
//! settings. Configuration is loaded from a TOML file; every section and
//! field has a default, so an empty file is a valid configuration. The
//! CoinGecko API key is the one sensitive value and comes only from the
//! `COINGECKO_API_KEY` environment variable, never from the file.
//!
//! # Example
//!
//! ```no_run
//! use moonliga::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.logging.init();
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::{PayoutCurve, ResidualPolicy, ScoringPolicy};
use crate::engine::{CompetitionRules, SchedulerConfig};
use crate::error::{ConfigError, Result};
use crate::market::CachePolicy;

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Market data provider settings.
    #[serde(default)]
    pub market: MarketConfig,

    /// Quote cache freshness settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Score aggregation settings.
    #[serde(default)]
    pub scoring: ScoringPolicy,

    /// Prize allocation settings.
    #[serde(default)]
    pub prizes: PrizeConfig,

    /// Roster settings.
    #[serde(default)]
    pub competition: CompetitionConfig,

    /// Sweep loop settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Market data provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// API root of the quote provider.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Quote currency for prices and market caps.
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,

    /// How many top-of-market tokens each fetch covers.
    #[serde(default = "default_top_limit")]
    pub top_limit: usize,

    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Fetch attempts before a refresh gives up.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Base backoff between attempts in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// API key, loaded from the `COINGECKO_API_KEY` environment variable.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_endpoint() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_top_limit() -> usize {
    100
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            vs_currency: default_vs_currency(),
            top_limit: default_top_limit(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            api_key: None,
        }
    }
}

/// Quote cache freshness settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Seconds a cached fetch stays fresh.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Deadline in seconds for a single upstream refresh.
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_refresh_timeout_secs() -> u64 {
    10
}

impl CacheConfig {
    /// The policy consumed by the cache.
    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(self.ttl_secs),
            refresh_timeout: Duration::from_secs(self.refresh_timeout_secs),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
        }
    }
}

/// Prize allocation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PrizeConfig {
    /// Percentage of the pool per rank, best rank first. Validated on
    /// parse: non-negative shares summing to at most 100.
    #[serde(default)]
    pub payout_curve: PayoutCurve,

    /// Where the rounding residual goes.
    #[serde(default)]
    pub residual: ResidualPolicy,

    /// Decimal places for awarded prizes.
    #[serde(default = "default_prize_precision")]
    pub precision: u32,
}

fn default_prize_precision() -> u32 {
    2
}

impl Default for PrizeConfig {
    fn default() -> Self {
        Self {
            payout_curve: PayoutCurve::default(),
            residual: ResidualPolicy::default(),
            precision: default_prize_precision(),
        }
    }
}

/// Roster settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CompetitionConfig {
    /// Exact number of token picks per roster.
    #[serde(default = "default_team_size")]
    pub team_size: usize,
}

fn default_team_size() -> usize {
    10
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            team_size: default_team_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl LoggingConfig {
    /// Initialize the tracing subscriber with this logging configuration.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed, the payout
    /// curve is invalid, or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        // API key from the environment only, never from the config file.
        config.market.api_key = std::env::var("COINGECKO_API_KEY").ok();

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// The engine rules this configuration describes.
    #[must_use]
    pub fn rules(&self) -> CompetitionRules {
        CompetitionRules {
            team_size: self.competition.team_size,
            top_limit: self.market.top_limit,
            scoring: self.scoring,
            payout: self.prizes.payout_curve.clone(),
            residual: self.prizes.residual,
            prize_precision: self.prizes.precision,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.market.endpoint.is_empty() {
            return Err(ConfigError::MissingField {
                field: "market.endpoint",
            }
            .into());
        }
        if self.market.top_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "market.top_limit",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.market.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "market.timeout_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.market.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "market.retry_max_attempts",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.cache.refresh_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.refresh_timeout_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.scoring.precision > 28 {
            return Err(ConfigError::InvalidValue {
                field: "scoring.precision",
                reason: "decimal places beyond 28 are not representable".to_string(),
            }
            .into());
        }
        if self.prizes.precision > 28 {
            return Err(ConfigError::InvalidValue {
                field: "prizes.precision",
                reason: "decimal places beyond 28 are not representable".to_string(),
            }
            .into());
        }
        if self.competition.team_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "competition.team_size",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.scheduler.tick_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.tick_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
