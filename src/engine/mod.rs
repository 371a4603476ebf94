//! Competition lifecycle engine and its scheduler.

mod lifecycle;
mod scheduler;

pub use lifecycle::{CompetitionEngine, CompetitionRules, EndOutcome, StartOutcome, Trigger};
pub use scheduler::{Scheduler, SchedulerConfig, SweepOutcome};
