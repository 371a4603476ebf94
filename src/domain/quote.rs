//! Normalized market quotes as served by the cache layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::Symbol;

/// Price represented as a Decimal for precision.
pub type Price = Decimal;

/// A single token quote, normalized from whichever upstream produced it.
///
/// Quotes carry the observation timestamp assigned by the fetch that
/// produced them, not the time they were read from the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenQuote {
    /// Ticker symbol, uppercase.
    pub symbol: Symbol,
    /// Human-readable token name.
    pub name: String,
    /// Spot price in the quote currency (USD).
    pub price: Price,
    /// Total market capitalization in the quote currency.
    pub market_cap: Decimal,
    /// Rank by market capitalization, 1-based.
    pub rank: u32,
    /// 24h percent price change, when the upstream reports one.
    pub change_24h: Option<Decimal>,
    /// When the upstream observation was made.
    pub observed_at: DateTime<Utc>,
}

impl TokenQuote {
    /// True when the quoted price is usable for scoring.
    ///
    /// Upstreams occasionally emit zero or negative prices for delisted
    /// tokens; those rows must never seed a snapshot.
    #[must_use]
    pub fn has_usable_price(&self) -> bool {
        self.price > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(price: Decimal) -> TokenQuote {
        TokenQuote {
            symbol: Symbol::new("BTC"),
            name: "Bitcoin".to_string(),
            price,
            market_cap: dec!(1_000_000_000),
            rank: 1,
            change_24h: Some(dec!(2.5)),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn positive_price_is_usable() {
        assert!(quote(dec!(67000.12)).has_usable_price());
    }

    #[test]
    fn zero_price_is_not_usable() {
        assert!(!quote(Decimal::ZERO).has_usable_price());
    }
}
