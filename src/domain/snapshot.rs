//! Point-in-time price captures bracketing a competition window.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CompetitionId, Symbol};
use super::quote::{Price, TokenQuote};

/// Which end of the competition window a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotPhase {
    /// Taken when the competition starts.
    Start,
    /// Taken when the competition ends.
    End,
}

impl fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotPhase::Start => "start",
            SnapshotPhase::End => "end",
        };
        write!(f, "{s}")
    }
}

/// Immutable price capture for one competition phase.
///
/// At most one snapshot may exist per `(competition, phase)` pair; the
/// snapshot store enforces that. Prices are keyed by symbol and only
/// usable prices make it in, so a lookup miss means the token was not
/// priceable at capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    competition_id: CompetitionId,
    phase: SnapshotPhase,
    prices: BTreeMap<Symbol, Price>,
    taken_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Build a snapshot for `wanted` symbols out of the given quotes.
    ///
    /// Symbols missing from `quotes` or quoted with an unusable price are
    /// left out of the map. An empty result is legal; scoring treats the
    /// affected teams as partial.
    #[must_use]
    pub fn capture(
        competition_id: CompetitionId,
        phase: SnapshotPhase,
        wanted: &BTreeSet<Symbol>,
        quotes: &[TokenQuote],
        taken_at: DateTime<Utc>,
    ) -> Self {
        let prices = quotes
            .iter()
            .filter(|q| q.has_usable_price() && wanted.contains(&q.symbol))
            .map(|q| (q.symbol.clone(), q.price))
            .collect();
        Self {
            competition_id,
            phase,
            prices,
            taken_at,
        }
    }

    /// Reconstruct a snapshot from already-validated parts, e.g. rows
    /// loaded from a store.
    #[must_use]
    pub fn from_parts(
        competition_id: CompetitionId,
        phase: SnapshotPhase,
        prices: BTreeMap<Symbol, Price>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            competition_id,
            phase,
            prices,
            taken_at,
        }
    }

    /// The competition this snapshot belongs to.
    #[must_use]
    pub fn competition_id(&self) -> &CompetitionId {
        &self.competition_id
    }

    /// Start or end of the window.
    #[must_use]
    pub fn phase(&self) -> SnapshotPhase {
        self.phase
    }

    /// When the capture was taken.
    #[must_use]
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Price for a symbol, if it was captured.
    #[must_use]
    pub fn price(&self, symbol: &Symbol) -> Option<Price> {
        self.prices.get(symbol).copied()
    }

    /// Symbols captured in this snapshot, in lexical order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.prices.keys()
    }

    /// Number of captured prices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// True when no prices were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn quote(symbol: &str, price: Price) -> TokenQuote {
        TokenQuote {
            symbol: Symbol::new(symbol),
            name: symbol.to_string(),
            price,
            market_cap: dec!(1000),
            rank: 1,
            change_24h: None,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn capture_keeps_only_wanted_symbols() {
        let wanted: BTreeSet<Symbol> = [Symbol::new("BTC"), Symbol::new("ETH")].into();
        let quotes = vec![
            quote("BTC", dec!(67000)),
            quote("ETH", dec!(3500)),
            quote("SOL", dec!(150)),
        ];

        let snap = PriceSnapshot::capture(
            CompetitionId::from("c1"),
            SnapshotPhase::Start,
            &wanted,
            &quotes,
            Utc::now(),
        );

        assert_eq!(snap.len(), 2);
        assert_eq!(snap.price(&Symbol::new("BTC")), Some(dec!(67000)));
        assert_eq!(snap.price(&Symbol::new("SOL")), None);
    }

    #[test]
    fn capture_drops_unusable_prices() {
        let wanted: BTreeSet<Symbol> = [Symbol::new("BTC"), Symbol::new("DEAD")].into();
        let quotes = vec![quote("BTC", dec!(67000)), quote("DEAD", Decimal::ZERO)];

        let snap = PriceSnapshot::capture(
            CompetitionId::from("c1"),
            SnapshotPhase::End,
            &wanted,
            &quotes,
            Utc::now(),
        );

        assert_eq!(snap.len(), 1);
        assert_eq!(snap.price(&Symbol::new("DEAD")), None);
    }

    #[test]
    fn empty_capture_is_legal() {
        let wanted = BTreeSet::new();
        let snap = PriceSnapshot::capture(
            CompetitionId::from("c1"),
            SnapshotPhase::Start,
            &wanted,
            &[],
            Utc::now(),
        );

        assert!(snap.is_empty());
    }
}
