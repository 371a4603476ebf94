//! Competition aggregate and its lifecycle state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CompetitionId, LeagueId};

/// Lifecycle state of a competition.
///
/// The only legal transitions are `Pending -> Active` and
/// `Active -> Ended`. Stores enforce this with compare-and-swap updates,
/// so a stale or duplicated trigger can never rewind a competition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionStatus {
    /// Created, roster open, start snapshot not yet taken.
    Pending,
    /// Start snapshot recorded, scoring window open.
    Active,
    /// End snapshot recorded, scores and winners final.
    Ended,
}

impl CompetitionStatus {
    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(self, next: CompetitionStatus) -> bool {
        matches!(
            (self, next),
            (CompetitionStatus::Pending, CompetitionStatus::Active)
                | (CompetitionStatus::Active, CompetitionStatus::Ended)
        )
    }

    /// Returns true if no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, CompetitionStatus::Ended)
    }
}

impl fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompetitionStatus::Pending => "pending",
            CompetitionStatus::Active => "active",
            CompetitionStatus::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// A time-boxed competition within a league.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    /// Unique competition ID.
    pub id: CompetitionId,
    /// League this competition belongs to.
    pub league_id: LeagueId,
    /// Display name, e.g. "Week 12".
    pub name: String,
    /// Scheduled start of the scoring window.
    pub starts_at: DateTime<Utc>,
    /// Scheduled end of the scoring window.
    pub ends_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: CompetitionStatus,
    /// Per-competition prize pool override. `None` falls back to the
    /// league's default pool.
    pub prize_pool: Option<Decimal>,
    /// True once score records were written and prizes allocated. Set in
    /// the same store transaction that flips `status` to `Ended`.
    pub distributed: bool,
    /// When the competition row was created.
    pub created_at: DateTime<Utc>,
}

impl Competition {
    /// True once the scheduled start time has been reached.
    #[must_use]
    pub fn start_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_at
    }

    /// True once the scheduled end time has been reached.
    #[must_use]
    pub fn end_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }

    /// Scheduled-start guard: pending and due.
    #[must_use]
    pub fn can_start(&self, now: DateTime<Utc>) -> bool {
        self.status == CompetitionStatus::Pending && self.start_due(now)
    }

    /// Scheduled-end guard: active and due.
    #[must_use]
    pub fn can_end(&self, now: DateTime<Utc>) -> bool {
        self.status == CompetitionStatus::Active && self.end_due(now)
    }
}
