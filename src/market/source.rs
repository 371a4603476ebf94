//! Market data source trait definitions.
//!
//! Any upstream capable of producing a ranked token list can sit behind
//! the cache by implementing [`MarketDataSource`].

use async_trait::async_trait;

use crate::domain::TokenQuote;
use crate::error::MarketDataError;

/// Upstream provider of top-N token quotes.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the current top `limit` tokens by market cap.
    ///
    /// Implementations validate rows at this boundary: whatever comes
    /// back is already normalized [`TokenQuote`] data, never raw payload.
    async fn fetch_top_tokens(&self, limit: usize) -> Result<Vec<TokenQuote>, MarketDataError>;

    /// Get the source name for logging/debugging.
    fn source_name(&self) -> &'static str;
}
