//! Market data acquisition: the source port, the cache in front of it,
//! and the CoinGecko adapter behind it.

mod cache;
mod coingecko;
mod source;

pub use cache::{CacheMetadata, CachePolicy, CachedQuotes, EntryMetadata, MarketCache, MarketKey};
pub use coingecko::CoinGeckoSource;
pub use source::MarketDataSource;
