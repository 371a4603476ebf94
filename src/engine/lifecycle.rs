//! Competition lifecycle controller.
//!
//! Drives `pending -> active -> ended` with guards recomputed from
//! persisted state on every attempt. Idempotency comes from two store
//! primitives rather than in-memory flags: snapshot creation rejects
//! duplicates, and status updates are compare-and-swap. Re-invoking a
//! transition after a crash resumes it; invoking it twice concurrently
//! resolves to exactly one winner.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{
    allocate_prizes, rank_records, score_teams, Competition, CompetitionId, CompetitionStatus,
    League, LeagueId, PayoutCurve, PriceSnapshot, ResidualPolicy, ScoreRecord, ScoringPolicy,
    SnapshotPhase, Symbol, Team, UserId,
};
use crate::error::{LifecycleError, StoreError};
use crate::market::MarketCache;
use crate::store::Store;

/// What initiated a transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Scheduler sweep. Time guards apply.
    Scheduled,
    /// Operator action. Bypasses the time guard, never the status guard.
    Manual,
}

/// Tunables applied to every competition this engine drives.
#[derive(Debug, Clone)]
pub struct CompetitionRules {
    /// Exact number of token picks per roster.
    pub team_size: usize,
    /// How many top-of-market tokens snapshots draw from.
    pub top_limit: usize,
    /// Aggregate and precision for team scores.
    pub scoring: ScoringPolicy,
    /// Percentage of the pool per rank.
    pub payout: PayoutCurve,
    /// Where the prize rounding residual goes.
    pub residual: ResidualPolicy,
    /// Decimal places for awarded prizes.
    pub prize_precision: u32,
}

impl Default for CompetitionRules {
    fn default() -> Self {
        Self {
            team_size: 10,
            top_limit: 100,
            scoring: ScoringPolicy::default(),
            payout: PayoutCurve::default(),
            residual: ResidualPolicy::CarryToTop,
            prize_precision: 2,
        }
    }
}

/// Result of a start attempt.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    /// Competition as persisted after the attempt.
    pub competition: Competition,
    /// True for exactly one caller per competition.
    pub newly_started: bool,
}

/// Result of an end attempt.
#[derive(Debug, Clone)]
pub struct EndOutcome {
    /// Competition as persisted after the attempt.
    pub competition: Competition,
    /// True for exactly one caller per competition.
    pub newly_ended: bool,
    /// Final ranked records with prizes, winner first.
    pub records: Vec<ScoreRecord>,
}

/// Orchestrates competitions against a store and the market cache.
pub struct CompetitionEngine {
    store: Arc<dyn Store>,
    cache: Arc<MarketCache>,
    rules: CompetitionRules,
}

impl CompetitionEngine {
    pub fn new(store: Arc<dyn Store>, cache: Arc<MarketCache>, rules: CompetitionRules) -> Self {
        Self {
            store,
            cache,
            rules,
        }
    }

    #[must_use]
    pub fn rules(&self) -> &CompetitionRules {
        &self.rules
    }

    /// Current persisted state of a competition.
    pub async fn status(&self, id: &CompetitionId) -> Result<Competition, LifecycleError> {
        self.load(id).await
    }

    /// Advisory check: would a start attempt open a fresh transition?
    ///
    /// False does not mean `start_competition` must fail; a crashed start
    /// leaves its snapshot behind and reports false here while the
    /// transition itself remains resumable.
    pub async fn can_start(
        &self,
        id: &CompetitionId,
        trigger: Trigger,
    ) -> Result<bool, LifecycleError> {
        let competition = self.load(id).await?;
        if competition.status != CompetitionStatus::Pending {
            return Ok(false);
        }
        if trigger == Trigger::Scheduled && !competition.start_due(Utc::now()) {
            return Ok(false);
        }
        let existing = self.store.get_snapshot(id, SnapshotPhase::Start).await?;
        Ok(existing.is_none())
    }

    /// Advisory check mirroring [`Self::can_start`] for the end transition.
    pub async fn can_end(
        &self,
        id: &CompetitionId,
        trigger: Trigger,
    ) -> Result<bool, LifecycleError> {
        let competition = self.load(id).await?;
        if competition.status != CompetitionStatus::Active {
            return Ok(false);
        }
        if trigger == Trigger::Scheduled && !competition.end_due(Utc::now()) {
            return Ok(false);
        }
        let existing = self.store.get_snapshot(id, SnapshotPhase::End).await?;
        Ok(existing.is_none())
    }

    /// Take the start snapshot and open the scoring window.
    ///
    /// Under concurrent or repeated invocation exactly one caller gets
    /// `newly_started = true`; the rest find the status swap already
    /// applied. A caller on a competition that is already active or ended
    /// gets [`LifecycleError::InvalidTransition`] with the current status.
    pub async fn start_competition(
        &self,
        id: &CompetitionId,
        trigger: Trigger,
    ) -> Result<StartOutcome, LifecycleError> {
        let competition = self.load(id).await?;

        if competition.status != CompetitionStatus::Pending {
            return Err(LifecycleError::InvalidTransition {
                competition_id: id.clone(),
                from: competition.status,
                attempted: CompetitionStatus::Active,
            });
        }
        if trigger == Trigger::Scheduled && !competition.start_due(Utc::now()) {
            return Err(LifecycleError::NotYetDue {
                competition_id: id.clone(),
                action: "start",
            });
        }

        let teams = self.store.list_teams(id).await?;
        let captured = self.capture(id, SnapshotPhase::Start, &teams).await?;
        let snapshot = match self.store.create_snapshot(&captured).await {
            Ok(()) => captured,
            Err(StoreError::DuplicateSnapshot { .. }) => {
                // A previous attempt died between snapshot and activation;
                // scoring will use what it wrote, so report that one.
                debug!(competition_id = %id, "start snapshot already exists, resuming");
                self.require_snapshot(id, SnapshotPhase::Start).await?
            }
            Err(err) => return Err(err.into()),
        };

        let newly_started = self
            .store
            .update_status(id, CompetitionStatus::Pending, CompetitionStatus::Active)
            .await?;
        if newly_started {
            info!(
                competition_id = %id,
                trigger = ?trigger,
                teams = teams.len(),
                priced = snapshot.len(),
                "competition started"
            );
        } else {
            debug!(competition_id = %id, "start already applied by a concurrent caller");
        }

        let competition = self.load(id).await?;
        Ok(StartOutcome {
            competition,
            newly_started,
        })
    }

    /// Take the end snapshot, score, rank, allocate prizes and finalize.
    ///
    /// The finalize write is the single atomic commit point: records,
    /// `status = ended` and `distributed = true` land together, guarded by
    /// a compare-and-swap on the active status. Losing racers and callers
    /// retrying after the winner read back the persisted records with
    /// `newly_ended = false`. A crash anywhere before finalize leaves the
    /// competition active and this method resumable.
    pub async fn end_competition(
        &self,
        id: &CompetitionId,
        trigger: Trigger,
    ) -> Result<EndOutcome, LifecycleError> {
        let competition = self.load(id).await?;

        match competition.status {
            CompetitionStatus::Active => {}
            CompetitionStatus::Ended => {
                let records = self.store.list_score_records(id).await?;
                return Ok(EndOutcome {
                    competition,
                    newly_ended: false,
                    records,
                });
            }
            CompetitionStatus::Pending => {
                return Err(LifecycleError::InvalidTransition {
                    competition_id: id.clone(),
                    from: competition.status,
                    attempted: CompetitionStatus::Ended,
                });
            }
        }

        if trigger == Trigger::Scheduled && !competition.end_due(Utc::now()) {
            return Err(LifecycleError::NotYetDue {
                competition_id: id.clone(),
                action: "end",
            });
        }

        let teams = self.store.list_teams(id).await?;
        let captured = self.capture(id, SnapshotPhase::End, &teams).await?;
        let end_snapshot = match self.store.create_snapshot(&captured).await {
            Ok(()) => captured,
            Err(StoreError::DuplicateSnapshot { .. }) => {
                // A previous attempt died between snapshot and finalize;
                // score from what it wrote.
                debug!(competition_id = %id, "end snapshot already exists, resuming");
                self.require_snapshot(id, SnapshotPhase::End).await?
            }
            Err(err) => return Err(err.into()),
        };
        let start_snapshot = self.require_snapshot(id, SnapshotPhase::Start).await?;

        let records = score_teams(&start_snapshot, &end_snapshot, &teams, &self.rules.scoring);
        let mut records = rank_records(records, &teams);
        let pool = self.prize_pool(&competition).await?;
        allocate_prizes(
            &mut records,
            pool,
            &self.rules.payout,
            self.rules.residual,
            self.rules.prize_precision,
        );

        let newly_ended = self.store.finalize_competition(id, &records).await?;
        if newly_ended {
            info!(
                competition_id = %id,
                trigger = ?trigger,
                teams = records.len(),
                pool = %pool,
                "competition ended, prizes allocated"
            );
        } else {
            debug!(competition_id = %id, "finalize already applied by a concurrent caller");
            records = self.store.list_score_records(id).await?;
        }

        let competition = self.load(id).await?;
        Ok(EndOutcome {
            competition,
            newly_ended,
            records,
        })
    }

    /// Enter a roster into a pending competition.
    ///
    /// Rosters are immutable once the competition starts. The registration
    /// timestamp is assigned here, never taken from the caller, since it
    /// doubles as the ranking tie-breaker.
    pub async fn register_team(
        &self,
        competition_id: &CompetitionId,
        user_id: UserId,
        name: &str,
        picks: Vec<Symbol>,
    ) -> Result<Team, LifecycleError> {
        let competition = self.load(competition_id).await?;
        if competition.status != CompetitionStatus::Pending {
            return Err(LifecycleError::RegistrationClosed {
                competition_id: competition_id.clone(),
                status: competition.status,
            });
        }

        if picks.len() != self.rules.team_size {
            return Err(LifecycleError::InvalidTeam {
                competition_id: competition_id.clone(),
                reason: format!(
                    "roster must pick exactly {} tokens, got {}",
                    self.rules.team_size,
                    picks.len()
                ),
            });
        }

        let team = Team {
            competition_id: competition_id.clone(),
            user_id,
            name: name.to_string(),
            symbols: picks,
            registered_at: Utc::now(),
        };
        if let Some(symbol) = team.duplicate_pick() {
            return Err(LifecycleError::InvalidTeam {
                competition_id: competition_id.clone(),
                reason: format!("duplicate pick {symbol}"),
            });
        }

        let league = self.league(&competition.league_id).await?;
        if league.max_teams.is_some() {
            let current = self.store.list_teams(competition_id).await?.len();
            if !league.has_capacity(current) {
                return Err(LifecycleError::InvalidTeam {
                    competition_id: competition_id.clone(),
                    reason: format!("competition is full ({current} teams)"),
                });
            }
        }

        self.store.register_team(&team).await?;
        info!(
            competition_id = %competition_id,
            user_id = %team.user_id,
            picks = team.symbols.len(),
            "team registered"
        );
        Ok(team)
    }

    async fn capture(
        &self,
        id: &CompetitionId,
        phase: SnapshotPhase,
        teams: &[Team],
    ) -> Result<PriceSnapshot, LifecycleError> {
        let universe: BTreeSet<Symbol> = teams.iter().flat_map(Team::symbol_set).collect();
        let served = self.cache.get_market_tokens(self.rules.top_limit).await?;
        if served.stale {
            warn!(
                competition_id = %id,
                phase = %phase,
                age_secs = served.age.as_secs(),
                "capturing snapshot from stale quotes"
            );
        }
        Ok(PriceSnapshot::capture(
            id.clone(),
            phase,
            &universe,
            &served.quotes,
            Utc::now(),
        ))
    }

    async fn load(&self, id: &CompetitionId) -> Result<Competition, LifecycleError> {
        Ok(self
            .store
            .get_competition(id)
            .await?
            .ok_or_else(|| StoreError::CompetitionNotFound(id.clone()))?)
    }

    async fn league(&self, id: &LeagueId) -> Result<League, LifecycleError> {
        Ok(self
            .store
            .get_league(id)
            .await?
            .ok_or_else(|| StoreError::LeagueNotFound(id.clone()))?)
    }

    async fn require_snapshot(
        &self,
        id: &CompetitionId,
        phase: SnapshotPhase,
    ) -> Result<PriceSnapshot, LifecycleError> {
        Ok(self
            .store
            .get_snapshot(id, phase)
            .await?
            .ok_or_else(|| StoreError::SnapshotNotFound {
                competition_id: id.clone(),
                phase,
            })?)
    }

    async fn prize_pool(&self, competition: &Competition) -> Result<Decimal, LifecycleError> {
        if let Some(pool) = competition.prize_pool {
            return Ok(pool);
        }
        let league = self.league(&competition.league_id).await?;
        Ok(league.default_prize_pool)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::market::CachePolicy;
    use crate::store::{CompetitionStore, LeagueStore, MemoryStore, SnapshotStore};
    use crate::testkit::market::ScriptedMarketSource;
    use crate::testkit::{competition, league, quotes};

    struct Fixture {
        engine: CompetitionEngine,
        store: Arc<MemoryStore>,
        cache: Arc<MarketCache>,
    }

    fn fixture(source: ScriptedMarketSource, team_size: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MarketCache::new(Arc::new(source), CachePolicy::default()));
        let rules = CompetitionRules {
            team_size,
            ..CompetitionRules::default()
        };
        let engine = CompetitionEngine::new(store.clone(), Arc::clone(&cache), rules);
        Fixture {
            engine,
            store,
            cache,
        }
    }

    async fn seed(store: &MemoryStore, starts_in_mins: i64, ends_in_mins: i64) -> Competition {
        let lg = league("Main League");
        store.create_league(&lg).await.unwrap();
        let now = Utc::now();
        let comp = competition(
            &lg.id,
            now + chrono::Duration::minutes(starts_in_mins),
            now + chrono::Duration::minutes(ends_in_mins),
        );
        store.create_competition(&comp).await.unwrap();
        comp
    }

    fn picks(symbols: &[&str]) -> Vec<Symbol> {
        symbols.iter().copied().map(Symbol::new).collect()
    }

    #[tokio::test]
    async fn start_takes_snapshot_and_activates() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100)), ("ETH", dec!(200))]));
        let f = fixture(source, 2);
        let comp = seed(&f.store, -60, 60).await;
        f.engine
            .register_team(&comp.id, UserId::new("alice"), "Alice", picks(&["BTC", "ETH"]))
            .await
            .unwrap();

        let outcome = f
            .engine
            .start_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap();

        assert!(outcome.newly_started);
        assert_eq!(outcome.competition.status, CompetitionStatus::Active);
        let snapshot = f
            .store
            .get_snapshot(&comp.id, SnapshotPhase::Start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 2);
        let captured: Vec<&str> = snapshot.symbols().map(Symbol::as_str).collect();
        assert_eq!(captured, ["BTC", "ETH"]);
    }

    #[tokio::test]
    async fn start_before_start_time_needs_manual_trigger() {
        let source = ScriptedMarketSource::new().push_quotes(quotes(&[("BTC", dec!(100))]));
        let f = fixture(source, 1);
        let comp = seed(&f.store, 60, 120).await;

        let err = f
            .engine
            .start_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotYetDue { .. }));

        let outcome = f
            .engine
            .start_competition(&comp.id, Trigger::Manual)
            .await
            .unwrap();
        assert!(outcome.newly_started);
    }

    #[tokio::test]
    async fn resumed_start_keeps_the_persisted_snapshot() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100)), ("ETH", dec!(200))]));
        let f = fixture(source, 2);
        let comp = seed(&f.store, -60, 60).await;
        f.engine
            .register_team(&comp.id, UserId::new("alice"), "Alice", picks(&["BTC", "ETH"]))
            .await
            .unwrap();

        // A previous attempt died after writing its snapshot but before
        // the status swap; its capture saw only BTC.
        let wanted: BTreeSet<Symbol> = [Symbol::new("BTC")].into_iter().collect();
        let persisted = PriceSnapshot::capture(
            comp.id.clone(),
            SnapshotPhase::Start,
            &wanted,
            &quotes(&[("BTC", dec!(90))]),
            comp.starts_at,
        );
        f.store.create_snapshot(&persisted).await.unwrap();

        let outcome = f
            .engine
            .start_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap();
        assert!(outcome.newly_started);
        assert_eq!(outcome.competition.status, CompetitionStatus::Active);

        // The fresh capture lost to the persisted snapshot, which stays
        // the baseline for scoring.
        let snapshot = f
            .store
            .get_snapshot(&comp.id, SnapshotPhase::Start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.price(&Symbol::new("BTC")), Some(dec!(90)));
    }

    #[tokio::test]
    async fn restart_reports_current_status() {
        let source = ScriptedMarketSource::new().push_quotes(quotes(&[("BTC", dec!(100))]));
        let f = fixture(source, 1);
        let comp = seed(&f.store, -60, 60).await;
        f.engine
            .start_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap();

        let err = f
            .engine
            .start_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: CompetitionStatus::Active,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn end_while_pending_is_rejected_with_status() {
        let f = fixture(ScriptedMarketSource::new(), 1);
        let comp = seed(&f.store, -60, -30).await;

        let err = f
            .engine
            .end_competition(&comp.id, Trigger::Manual)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: CompetitionStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn end_scores_ranks_and_pays_prizes() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[
                ("BTC", dec!(100)),
                ("ETH", dec!(200)),
                ("SOL", dec!(10)),
            ]))
            .push_quotes(quotes(&[
                ("BTC", dec!(110)),
                ("ETH", dec!(160)),
                ("SOL", dec!(15)),
            ]));
        let f = fixture(source, 2);
        let comp = seed(&f.store, -120, -60).await;
        f.engine
            .register_team(&comp.id, UserId::new("alice"), "Alice", picks(&["BTC", "ETH"]))
            .await
            .unwrap();
        f.engine
            .register_team(&comp.id, UserId::new("bob"), "Bob", picks(&["BTC", "SOL"]))
            .await
            .unwrap();

        f.engine
            .start_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap();
        f.cache.invalidate_all();
        let outcome = f
            .engine
            .end_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap();

        // BTC +10%, ETH -20%, SOL +50%: bob sums to 60, alice to -10.
        assert!(outcome.newly_ended);
        assert!(outcome.competition.distributed);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].user_id.as_str(), "bob");
        assert_eq!(outcome.records[0].score, dec!(60));
        assert_eq!(outcome.records[0].rank, Some(1));
        assert_eq!(outcome.records[0].prize, dec!(500));
        assert_eq!(outcome.records[1].user_id.as_str(), "alice");
        assert_eq!(outcome.records[1].score, dec!(-10));
        assert_eq!(outcome.records[1].prize, dec!(300));

        let again = f
            .engine
            .end_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap();
        assert!(!again.newly_ended);
        assert_eq!(again.records.len(), 2);
        assert_eq!(again.records[0].prize, dec!(500));
    }

    #[tokio::test]
    async fn registration_closes_once_active() {
        let source = ScriptedMarketSource::new().push_quotes(quotes(&[("BTC", dec!(100))]));
        let f = fixture(source, 1);
        let comp = seed(&f.store, -60, 60).await;
        f.engine
            .start_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap();

        let err = f
            .engine
            .register_team(&comp.id, UserId::new("late"), "Late", picks(&["BTC"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::RegistrationClosed {
                status: CompetitionStatus::Active,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn roster_size_and_duplicate_picks_are_validated() {
        let f = fixture(ScriptedMarketSource::new(), 2);
        let comp = seed(&f.store, -60, 60).await;

        let err = f
            .engine
            .register_team(&comp.id, UserId::new("a"), "A", picks(&["BTC"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTeam { .. }));

        let err = f
            .engine
            .register_team(&comp.id, UserId::new("a"), "A", picks(&["BTC", "btc"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTeam { .. }));
    }

    #[tokio::test]
    async fn league_capacity_caps_registration() {
        let f = fixture(ScriptedMarketSource::new(), 1);
        let mut lg = league("Capped");
        lg.max_teams = Some(1);
        f.store.create_league(&lg).await.unwrap();
        let now = Utc::now();
        let comp = competition(
            &lg.id,
            now - chrono::Duration::minutes(60),
            now + chrono::Duration::minutes(60),
        );
        f.store.create_competition(&comp).await.unwrap();

        f.engine
            .register_team(&comp.id, UserId::new("first"), "First", picks(&["BTC"]))
            .await
            .unwrap();
        let err = f
            .engine
            .register_team(&comp.id, UserId::new("second"), "Second", picks(&["ETH"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTeam { .. }));
    }

    #[tokio::test]
    async fn advisory_checks_track_status_time_and_snapshots() {
        let source = ScriptedMarketSource::new().push_quotes(quotes(&[("BTC", dec!(100))]));
        let f = fixture(source, 1);
        let comp = seed(&f.store, -60, 60).await;

        assert!(f.engine.can_start(&comp.id, Trigger::Scheduled).await.unwrap());
        assert!(!f.engine.can_end(&comp.id, Trigger::Scheduled).await.unwrap());

        f.engine
            .start_competition(&comp.id, Trigger::Scheduled)
            .await
            .unwrap();

        assert!(!f.engine.can_start(&comp.id, Trigger::Scheduled).await.unwrap());
        assert!(!f.engine.can_end(&comp.id, Trigger::Scheduled).await.unwrap());
        assert!(f.engine.can_end(&comp.id, Trigger::Manual).await.unwrap());
    }
}
