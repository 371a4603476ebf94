//! CoinGecko REST adapter.
//!
//! Fetches the ranked market list from the `coins/markets` endpoint and
//! normalizes rows into [`TokenQuote`] at this boundary. Rows without a
//! usable price are dropped here, never downstream.
//!
//! Authentication is optional: the public endpoint works unkeyed at a
//! low rate limit, and a demo API key (read from the environment, never
//! from config files) raises it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::{Client as HttpClient, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::source::MarketDataSource;
use crate::config::MarketConfig;
use crate::domain::{Symbol, TokenQuote};
use crate::error::MarketDataError;

/// HTTP client for the CoinGecko REST API.
pub struct CoinGeckoSource {
    http: HttpClient,
    base_url: String,
    vs_currency: String,
    api_key: Option<String>,
    retry_max_attempts: u32,
    retry_backoff_ms: u64,
}

impl CoinGeckoSource {
    /// Create a source with default currency and retry settings.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.coingecko.com/api/v3`
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            http: HttpClient::new(),
            base_url,
            vs_currency: "usd".into(),
            api_key: None,
            retry_max_attempts: 1,
            retry_backoff_ms: 0,
        }
    }

    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            http,
            base_url: config.endpoint.clone(),
            vs_currency: config.vs_currency.clone(),
            api_key: config.api_key.clone(),
            retry_max_attempts: config.retry_max_attempts,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    async fn get_rows(&self, limit: usize) -> Result<Vec<MarketRow>, MarketDataError> {
        let url = format!(
            "{}/coins/markets?vs_currency={}&order=market_cap_desc&per_page={}&page=1&price_change_percentage=24h",
            self.base_url, self.vs_currency, limit
        );

        let mut attempt = 0;
        let max_attempts = self.retry_max_attempts.max(1);

        loop {
            attempt += 1;
            match self.try_get(&url).await {
                Ok(rows) => return Ok(rows),
                Err(err) => {
                    if attempt >= max_attempts || !Self::should_retry(&err) {
                        return Err(err);
                    }
                    self.backoff(attempt, max_attempts, &err).await;
                }
            }
        }
    }

    async fn try_get(&self, url: &str) -> Result<Vec<MarketRow>, MarketDataError> {
        let mut request = self.http.get(url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| MarketDataError::Unavailable {
                reason: err.to_string(),
            })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            return Err(MarketDataError::RateLimited { retry_after_secs });
        }
        if !response.status().is_success() {
            return Err(MarketDataError::Unavailable {
                reason: format!("HTTP {}", response.status()),
            });
        }

        response
            .json::<Vec<MarketRow>>()
            .await
            .map_err(|err| MarketDataError::Malformed {
                reason: err.to_string(),
            })
    }

    fn should_retry(err: &MarketDataError) -> bool {
        matches!(err, MarketDataError::Unavailable { .. })
    }

    async fn backoff(&self, attempt: u32, max_attempts: u32, err: &MarketDataError) {
        warn!(
            attempt,
            max_attempts,
            error = %err,
            "CoinGecko request failed, retrying"
        );
        if self.retry_backoff_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=250);
            let delay = self.retry_backoff_ms * u64::from(attempt) + jitter;
            sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoSource {
    async fn fetch_top_tokens(&self, limit: usize) -> Result<Vec<TokenQuote>, MarketDataError> {
        info!(limit, vs_currency = %self.vs_currency, "Fetching top tokens from CoinGecko");

        let rows = self.get_rows(limit).await?;
        let observed_at = Utc::now();
        let total = rows.len();

        let quotes: Vec<TokenQuote> = rows
            .into_iter()
            .filter_map(|row| row.into_quote(observed_at))
            .collect();

        if quotes.len() < total {
            debug!(
                dropped = total - quotes.len(),
                "Dropped rows without a usable price"
            );
        }
        debug!(count = quotes.len(), "Fetched token quotes");

        Ok(quotes)
    }

    fn source_name(&self) -> &'static str {
        "coingecko"
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// One row of the `coins/markets` response, loosely typed the way the
/// upstream actually sends it.
#[derive(Debug, Deserialize)]
struct MarketRow {
    symbol: String,
    name: String,
    current_price: Option<Decimal>,
    market_cap: Option<Decimal>,
    market_cap_rank: Option<u32>,
    price_change_percentage_24h: Option<Decimal>,
}

impl MarketRow {
    /// Validate and convert into a domain quote. Rows the upstream left
    /// unpriced (delistings, very new listings) produce `None`.
    fn into_quote(self, observed_at: chrono::DateTime<Utc>) -> Option<TokenQuote> {
        let price = self.current_price?;
        if price <= Decimal::ZERO {
            return None;
        }
        Some(TokenQuote {
            symbol: Symbol::new(self.symbol),
            name: self.name,
            price,
            market_cap: self.market_cap.unwrap_or(Decimal::ZERO),
            rank: self.market_cap_rank.unwrap_or(0),
            change_24h: self.price_change_percentage_24h,
            observed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn row(json: &str) -> MarketRow {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn row_with_price_converts() {
        let row = row(
            r#"{
                "symbol": "btc",
                "name": "Bitcoin",
                "current_price": 67000.12,
                "market_cap": 1300000000000,
                "market_cap_rank": 1,
                "price_change_percentage_24h": 2.5
            }"#,
        );

        let quote = row.into_quote(Utc::now()).unwrap();
        assert_eq!(quote.symbol, Symbol::new("BTC"));
        assert_eq!(quote.price, dec!(67000.12));
        assert_eq!(quote.rank, 1);
        assert_eq!(quote.change_24h, Some(dec!(2.5)));
    }

    #[test]
    fn row_without_price_is_dropped() {
        let row = row(
            r#"{
                "symbol": "dead",
                "name": "Delisted",
                "current_price": null,
                "market_cap": null,
                "market_cap_rank": null,
                "price_change_percentage_24h": null
            }"#,
        );

        assert!(row.into_quote(Utc::now()).is_none());
    }

    #[test]
    fn row_with_zero_price_is_dropped() {
        let row = row(
            r#"{
                "symbol": "zero",
                "name": "Zero",
                "current_price": 0,
                "market_cap": 10,
                "market_cap_rank": 900,
                "price_change_percentage_24h": 0
            }"#,
        );

        assert!(row.into_quote(Utc::now()).is_none());
    }

    #[test]
    fn missing_rank_defaults_to_zero() {
        let row = row(
            r#"{
                "symbol": "new",
                "name": "Newcoin",
                "current_price": 0.5
            }"#,
        );

        let quote = row.into_quote(Utc::now()).unwrap();
        assert_eq!(quote.rank, 0);
        assert_eq!(quote.market_cap, Decimal::ZERO);
    }
}
