//! Live smoke test against the public CoinGecko API.

use std::env;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::timeout;

use moonliga::config::MarketConfig;
use moonliga::market::{CoinGeckoSource, MarketDataSource};

fn smoke_enabled() -> bool {
    matches!(env::var("MOONLIGA_SMOKE").ok().as_deref(), Some("1"))
}

#[tokio::test]
#[ignore = "requires MOONLIGA_SMOKE=1 and network access"]
async fn smoke_coingecko_top_of_market_readonly() {
    if !smoke_enabled() {
        eprintln!("Skipping smoke test (set MOONLIGA_SMOKE=1 to enable)");
        return;
    }

    let config = MarketConfig {
        api_key: env::var("COINGECKO_API_KEY").ok(),
        ..MarketConfig::default()
    };
    let source = CoinGeckoSource::from_config(&config);

    let quotes = timeout(Duration::from_secs(20), source.fetch_top_tokens(5))
        .await
        .expect("Timed out querying CoinGecko markets endpoint")
        .expect("Failed to fetch top-of-market quotes");

    assert!(
        !quotes.is_empty(),
        "Expected at least one quote from {}",
        config.endpoint
    );
    assert!(quotes.iter().all(|q| q.price > Decimal::ZERO));
    assert!(quotes.windows(2).all(|w| w[0].rank < w[1].rank));
}
