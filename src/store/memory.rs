//! In-memory store implementation.
//!
//! Backs tests and the demo runner. Every table sits behind one lock so
//! [`ScoreStore::finalize_competition`] gets the same all-or-nothing
//! behavior a relational adapter gets from a transaction.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{CompetitionStore, LeagueStore, ScoreStore, SnapshotStore, TeamStore};
use crate::domain::{
    Competition, CompetitionId, CompetitionStatus, League, LeagueId, PriceSnapshot, ScoreRecord,
    SnapshotPhase, Team, UserId,
};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Inner {
    competitions: HashMap<CompetitionId, Competition>,
    snapshots: HashMap<(CompetitionId, SnapshotPhase), PriceSnapshot>,
    teams: HashMap<CompetitionId, BTreeMap<UserId, Team>>,
    scores: HashMap<CompetitionId, Vec<ScoreRecord>>,
    leagues: HashMap<LeagueId, League>,
}

/// In-memory reference store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompetitionStore for MemoryStore {
    async fn create_competition(&self, competition: &Competition) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.competitions.contains_key(&competition.id) {
            return Err(StoreError::Persistence(format!(
                "competition {} already exists",
                competition.id
            )));
        }
        inner
            .competitions
            .insert(competition.id.clone(), competition.clone());
        Ok(())
    }

    async fn get_competition(
        &self,
        id: &CompetitionId,
    ) -> Result<Option<Competition>, StoreError> {
        Ok(self.inner.read().competitions.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &CompetitionId,
        from: CompetitionStatus,
        to: CompetitionStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let competition = inner
            .competitions
            .get_mut(id)
            .ok_or_else(|| StoreError::CompetitionNotFound(id.clone()))?;
        if competition.status != from {
            return Ok(false);
        }
        competition.status = to;
        Ok(true)
    }

    async fn list_due_to_start(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Competition>, StoreError> {
        let inner = self.inner.read();
        let mut due: Vec<Competition> = inner
            .competitions
            .values()
            .filter(|c| c.can_start(now))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.starts_at);
        Ok(due)
    }

    async fn list_due_to_end(&self, now: DateTime<Utc>) -> Result<Vec<Competition>, StoreError> {
        let inner = self.inner.read();
        let mut due: Vec<Competition> = inner
            .competitions
            .values()
            .filter(|c| c.can_end(now))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.ends_at);
        Ok(due)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn create_snapshot(&self, snapshot: &PriceSnapshot) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let key = (snapshot.competition_id().clone(), snapshot.phase());
        if inner.snapshots.contains_key(&key) {
            return Err(StoreError::DuplicateSnapshot {
                competition_id: key.0,
                phase: key.1,
            });
        }
        inner.snapshots.insert(key, snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(
        &self,
        id: &CompetitionId,
        phase: SnapshotPhase,
    ) -> Result<Option<PriceSnapshot>, StoreError> {
        Ok(self
            .inner
            .read()
            .snapshots
            .get(&(id.clone(), phase))
            .cloned())
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn register_team(&self, team: &Team) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let roster = inner.teams.entry(team.competition_id.clone()).or_default();
        if roster.contains_key(&team.user_id) {
            return Err(StoreError::DuplicateTeam {
                competition_id: team.competition_id.clone(),
                user_id: team.user_id.clone(),
            });
        }
        roster.insert(team.user_id.clone(), team.clone());
        Ok(())
    }

    async fn list_teams(&self, id: &CompetitionId) -> Result<Vec<Team>, StoreError> {
        Ok(self
            .inner
            .read()
            .teams
            .get(id)
            .map(|roster| roster.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn finalize_competition(
        &self,
        id: &CompetitionId,
        records: &[ScoreRecord],
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let competition = inner
            .competitions
            .get_mut(id)
            .ok_or_else(|| StoreError::CompetitionNotFound(id.clone()))?;
        if competition.status != CompetitionStatus::Active {
            return Ok(false);
        }
        competition.status = CompetitionStatus::Ended;
        competition.distributed = true;
        inner.scores.insert(id.clone(), records.to_vec());
        Ok(true)
    }

    async fn list_score_records(
        &self,
        id: &CompetitionId,
    ) -> Result<Vec<ScoreRecord>, StoreError> {
        Ok(self.inner.read().scores.get(id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LeagueStore for MemoryStore {
    async fn create_league(&self, league: &League) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.leagues.contains_key(&league.id) {
            return Err(StoreError::Persistence(format!(
                "league {} already exists",
                league.id
            )));
        }
        inner.leagues.insert(league.id.clone(), league.clone());
        Ok(())
    }

    async fn get_league(&self, id: &LeagueId) -> Result<Option<League>, StoreError> {
        Ok(self.inner.read().leagues.get(id).cloned())
    }
}
