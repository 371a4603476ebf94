use thiserror::Error;

use crate::domain::{CompetitionId, CompetitionStatus, LeagueId, SnapshotPhase, UserId};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Errors surfaced by market data sources and the cache in front of them.
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    #[error("upstream unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("rate limited by upstream")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("malformed upstream payload: {reason}")]
    Malformed { reason: String },
}

/// Errors surfaced by the persistence ports.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A snapshot already exists for this competition and phase. Under
    /// racing transitions this is the losing side's signal that the work
    /// is already done, not a failure.
    #[error("{phase} snapshot already exists for competition {competition_id}")]
    DuplicateSnapshot {
        competition_id: CompetitionId,
        phase: SnapshotPhase,
    },

    #[error("no {phase} snapshot for competition {competition_id}")]
    SnapshotNotFound {
        competition_id: CompetitionId,
        phase: SnapshotPhase,
    },

    #[error("competition {0} not found")]
    CompetitionNotFound(CompetitionId),

    #[error("league {0} not found")]
    LeagueNotFound(LeagueId),

    #[error("team already registered for competition {competition_id} by user {user_id}")]
    DuplicateTeam {
        competition_id: CompetitionId,
        user_id: UserId,
    },

    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Errors from competition lifecycle transitions.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("competition {competition_id}: cannot move from {from} to {attempted}")]
    InvalidTransition {
        competition_id: CompetitionId,
        from: CompetitionStatus,
        attempted: CompetitionStatus,
    },

    #[error("competition {competition_id} is not yet due to {action}")]
    NotYetDue {
        competition_id: CompetitionId,
        action: &'static str,
    },

    #[error("team rejected for competition {competition_id}: {reason}")]
    InvalidTeam {
        competition_id: CompetitionId,
        reason: String,
    },

    #[error("competition {competition_id} is {status}, registration is closed")]
    RegistrationClosed {
        competition_id: CompetitionId,
        status: CompetitionStatus,
    },

    #[error(transparent)]
    Market(#[from] MarketDataError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Market(#[from] MarketDataError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

pub type Result<T> = std::result::Result<T, Error>;
