//! Storage-agnostic domain logic.

mod competition;
mod id;
mod league;
mod quote;
mod ranking;
mod scoring;
mod snapshot;
mod team;

// Core domain types
pub use competition::{Competition, CompetitionStatus};
pub use id::{CompetitionId, LeagueId, Symbol, UserId};
pub use league::League;
pub use quote::{Price, TokenQuote};
pub use snapshot::{PriceSnapshot, SnapshotPhase};
pub use team::Team;

// Scoring and ranking
pub use ranking::{allocate_prizes, rank_records, CurveError, PayoutCurve, ResidualPolicy};
pub use scoring::{score_team, score_teams, token_return, Aggregate, ScoreRecord, ScoringPolicy};
