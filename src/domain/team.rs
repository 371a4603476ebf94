//! Team rosters: a user's token picks for one competition.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CompetitionId, Symbol, UserId};

/// One user's entry in a competition.
///
/// A user may register at most one team per competition; the stores key
/// teams by `(competition, user)`. `registered_at` doubles as the ranking
/// tie-breaker, so it must come from the store's clock, not the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    /// Competition this roster was entered into.
    pub competition_id: CompetitionId,
    /// Owning user.
    pub user_id: UserId,
    /// Display name for leaderboards.
    pub name: String,
    /// Picked token symbols, in pick order.
    pub symbols: Vec<Symbol>,
    /// When the roster was accepted.
    pub registered_at: DateTime<Utc>,
}

impl Team {
    /// Picks as a set, for snapshot universe construction.
    #[must_use]
    pub fn symbol_set(&self) -> BTreeSet<Symbol> {
        self.symbols.iter().cloned().collect()
    }

    /// First duplicated pick, if any.
    #[must_use]
    pub fn duplicate_pick(&self) -> Option<&Symbol> {
        let mut seen = BTreeSet::new();
        self.symbols.iter().find(|s| !seen.insert(*s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(symbols: &[&str]) -> Team {
        Team {
            competition_id: CompetitionId::from("c1"),
            user_id: UserId::new("u1"),
            name: "Moon Crew".to_string(),
            symbols: symbols.iter().copied().map(Symbol::new).collect(),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn symbol_set_deduplicates() {
        let t = team(&["BTC", "ETH", "BTC"]);
        assert_eq!(t.symbol_set().len(), 2);
    }

    #[test]
    fn duplicate_pick_found_after_normalization() {
        let t = team(&["btc", "BTC"]);
        assert_eq!(t.duplicate_pick(), Some(&Symbol::new("BTC")));
    }

    #[test]
    fn distinct_picks_have_no_duplicate() {
        let t = team(&["BTC", "ETH", "SOL"]);
        assert_eq!(t.duplicate_pick(), None);
    }
}
