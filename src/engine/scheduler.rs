//! Periodic sweep driving scheduled competition transitions.
//!
//! Every tick lists competitions whose start or end time has passed and
//! invokes the corresponding guarded transition. The guards make sweeps
//! safe to repeat and safe to run alongside manual triggers, so a sweep
//! failure never needs special recovery: the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::{CompetitionEngine, Trigger};
use crate::market::MarketCache;
use crate::store::Store;

/// Scheduler tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Touch the market cache on every sweep so the TTL window stays
    /// populated and snapshots rarely wait on an upstream fetch.
    #[serde(default = "default_warm_cache")]
    pub warm_cache: bool,
}

fn default_tick_secs() -> u64 {
    60
}

fn default_warm_cache() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            warm_cache: default_warm_cache(),
        }
    }
}

/// Counts from one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub started: usize,
    pub ended: usize,
    pub failed: usize,
}

/// Drives due transitions on a fixed interval.
pub struct Scheduler {
    engine: Arc<CompetitionEngine>,
    store: Arc<dyn Store>,
    cache: Arc<MarketCache>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        engine: Arc<CompetitionEngine>,
        store: Arc<dyn Store>,
        cache: Arc<MarketCache>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            cache,
            config,
        }
    }

    /// Sweep until `shutdown` flips true or its sender goes away.
    ///
    /// The first tick fires immediately, so transitions left over from a
    /// previous run resume as soon as the process is back up.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.tick_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_secs = self.config.tick_secs, "scheduler running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.sweep().await;
                    if outcome != SweepOutcome::default() {
                        debug!(
                            started = outcome.started,
                            ended = outcome.ended,
                            failed = outcome.failed,
                            "sweep finished"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass: start everything due to start, then end everything due
    /// to end. A competition whose whole window passed while the process
    /// was down goes through both transitions in the same pass.
    pub async fn sweep(&self) -> SweepOutcome {
        let now = Utc::now();
        let mut outcome = SweepOutcome::default();

        if self.config.warm_cache {
            let limit = self.engine.rules().top_limit;
            if let Err(err) = self.cache.get_market_tokens(limit).await {
                warn!(error = %err, "cache warm fetch failed");
            }
        }

        match self.store.list_due_to_start(now).await {
            Ok(due) => {
                for competition in due {
                    match self
                        .engine
                        .start_competition(&competition.id, Trigger::Scheduled)
                        .await
                    {
                        Ok(result) => {
                            if result.newly_started {
                                outcome.started += 1;
                            }
                        }
                        Err(err) => {
                            outcome.failed += 1;
                            warn!(
                                competition_id = %competition.id,
                                error = %err,
                                "scheduled start failed"
                            );
                        }
                    }
                }
            }
            Err(err) => warn!(error = %err, "listing competitions due to start failed"),
        }

        match self.store.list_due_to_end(now).await {
            Ok(due) => {
                for competition in due {
                    match self
                        .engine
                        .end_competition(&competition.id, Trigger::Scheduled)
                        .await
                    {
                        Ok(result) => {
                            if result.newly_ended {
                                outcome.ended += 1;
                            }
                        }
                        Err(err) => {
                            outcome.failed += 1;
                            warn!(
                                competition_id = %competition.id,
                                error = %err,
                                "scheduled end failed"
                            );
                        }
                    }
                }
            }
            Err(err) => warn!(error = %err, "listing competitions due to end failed"),
        }

        outcome
    }
}
