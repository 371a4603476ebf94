//! Builders for domain primitives used across tests.
//!
//! Provides concise factory functions for quotes, leagues, competitions,
//! and teams so tests focus on assertions rather than construction
//! boilerplate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{
    Competition, CompetitionId, CompetitionStatus, League, LeagueId, Symbol, Team, TokenQuote,
    UserId,
};

/// Create a [`TokenQuote`] with a usable price and filler metadata.
pub fn quote(symbol: &str, price: Decimal) -> TokenQuote {
    TokenQuote {
        symbol: Symbol::new(symbol),
        name: symbol.to_string(),
        price,
        market_cap: dec!(1_000_000),
        rank: 1,
        change_24h: None,
        observed_at: Utc::now(),
    }
}

/// Create a list of quotes from `(symbol, price)` pairs, ranked in order.
pub fn quotes(entries: &[(&str, Decimal)]) -> Vec<TokenQuote> {
    entries
        .iter()
        .enumerate()
        .map(|(i, (symbol, price))| TokenQuote {
            rank: i as u32 + 1,
            ..quote(symbol, *price)
        })
        .collect()
}

/// Create an uncapped [`League`] with a 1000-unit default pool.
pub fn league(name: &str) -> League {
    League {
        id: LeagueId::new(),
        name: name.to_string(),
        entry_fee: dec!(10),
        default_prize_pool: dec!(1000),
        max_teams: None,
        created_at: Utc::now(),
    }
}

/// Create a pending [`Competition`] with the given scoring window.
pub fn competition(
    league_id: &LeagueId,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Competition {
    Competition {
        id: CompetitionId::new(),
        league_id: league_id.clone(),
        name: "Week 1".to_string(),
        starts_at,
        ends_at,
        status: CompetitionStatus::Pending,
        prize_pool: None,
        distributed: false,
        created_at: Utc::now(),
    }
}

/// Create a [`Team`] for `user` picking the given symbols.
pub fn team(competition_id: &CompetitionId, user: &str, picks: &[&str]) -> Team {
    Team {
        competition_id: competition_id.clone(),
        user_id: UserId::new(user),
        name: format!("{user}'s team"),
        symbols: picks.iter().copied().map(Symbol::new).collect(),
        registered_at: Utc::now(),
    }
}
