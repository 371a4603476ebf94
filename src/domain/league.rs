//! League read-model shared by every competition it hosts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::LeagueId;

/// A league groups recurring competitions and carries their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    /// Unique league ID.
    pub id: LeagueId,
    /// Display name.
    pub name: String,
    /// Entry fee per team, in the quote currency. Collection happens in
    /// an external payments system; the engine only reads it.
    pub entry_fee: Decimal,
    /// Default prize pool for competitions without an override.
    pub default_prize_pool: Decimal,
    /// Maximum registered teams per competition, if capped.
    pub max_teams: Option<u32>,
    /// When the league was created.
    pub created_at: DateTime<Utc>,
}

impl League {
    /// True when another team can still register given `current` count.
    #[must_use]
    pub fn has_capacity(&self, current: usize) -> bool {
        match self.max_teams {
            Some(cap) => current < cap as usize,
            None => true,
        }
    }
}
