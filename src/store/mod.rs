//! Persistence ports consumed by the lifecycle engine.
//!
//! The relational store lives outside this crate; the engine only sees
//! these traits. [`MemoryStore`] is the in-process reference
//! implementation used by tests and the demo runner.
//!
//! Two operations carry the concurrency contract the engine relies on:
//! [`CompetitionStore::update_status`] is a compare-and-swap, and
//! [`SnapshotStore::create_snapshot`] rejects duplicates, so racing
//! transitions resolve to exactly one winner no matter how many callers
//! retry.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Competition, CompetitionId, CompetitionStatus, League, LeagueId, PriceSnapshot, ScoreRecord,
    SnapshotPhase, Team,
};
use crate::error::StoreError;

/// Storage operations for competitions.
#[async_trait]
pub trait CompetitionStore: Send + Sync {
    /// Persist a new competition.
    async fn create_competition(&self, competition: &Competition) -> Result<(), StoreError>;

    /// Get a competition by ID.
    async fn get_competition(
        &self,
        id: &CompetitionId,
    ) -> Result<Option<Competition>, StoreError>;

    /// Compare-and-swap the lifecycle status. Returns `false` when the
    /// stored status no longer equals `from`, i.e. a concurrent
    /// transition already won.
    async fn update_status(
        &self,
        id: &CompetitionId,
        from: CompetitionStatus,
        to: CompetitionStatus,
    ) -> Result<bool, StoreError>;

    /// Pending competitions whose scheduled start has passed.
    async fn list_due_to_start(&self, now: DateTime<Utc>)
        -> Result<Vec<Competition>, StoreError>;

    /// Active competitions whose scheduled end has passed.
    async fn list_due_to_end(&self, now: DateTime<Utc>) -> Result<Vec<Competition>, StoreError>;
}

/// Storage operations for snapshots.
///
/// Snapshots are write-once. There is deliberately no update or delete.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, failing with [`StoreError::DuplicateSnapshot`]
    /// when one already exists for the same competition and phase.
    async fn create_snapshot(&self, snapshot: &PriceSnapshot) -> Result<(), StoreError>;

    /// Get a snapshot by competition and phase.
    async fn get_snapshot(
        &self,
        id: &CompetitionId,
        phase: SnapshotPhase,
    ) -> Result<Option<PriceSnapshot>, StoreError>;
}

/// Storage operations for team rosters.
#[async_trait]
pub trait TeamStore: Send + Sync {
    /// Persist a roster, failing with [`StoreError::DuplicateTeam`] when
    /// the user already entered this competition.
    async fn register_team(&self, team: &Team) -> Result<(), StoreError>;

    /// All rosters registered for a competition.
    async fn list_teams(&self, id: &CompetitionId) -> Result<Vec<Team>, StoreError>;
}

/// Storage operations for derived score records.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Atomically write the final records, flip the competition to
    /// `Ended`, and mark prizes distributed.
    ///
    /// Returns `false` without writing anything when the competition is
    /// not `Active` anymore, which is how the losing side of a racing
    /// end-transition finds out. All three effects land in one
    /// transaction so no reader ever observes an ended competition
    /// without its results.
    async fn finalize_competition(
        &self,
        id: &CompetitionId,
        records: &[ScoreRecord],
    ) -> Result<bool, StoreError>;

    /// Final records for a competition, ranked order preserved.
    async fn list_score_records(&self, id: &CompetitionId) -> Result<Vec<ScoreRecord>, StoreError>;
}

/// Storage operations for leagues.
#[async_trait]
pub trait LeagueStore: Send + Sync {
    /// Persist a new league.
    async fn create_league(&self, league: &League) -> Result<(), StoreError>;

    /// Get a league by ID.
    async fn get_league(&self, id: &LeagueId) -> Result<Option<League>, StoreError>;
}

/// The full persistence surface the engine is wired against.
pub trait Store:
    CompetitionStore + SnapshotStore + TeamStore + ScoreStore + LeagueStore
{
}

impl<T> Store for T where
    T: CompetitionStore + SnapshotStore + TeamStore + ScoreStore + LeagueStore
{
}
