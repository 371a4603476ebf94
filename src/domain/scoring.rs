//! Deterministic scoring of team rosters from snapshot price deltas.
//!
//! Scoring is a pure function of the two snapshots bracketing the
//! competition window and the registered teams. Identical inputs always
//! produce identical records, so ended competitions can be re-scored for
//! audit and the results diffed against what was persisted.
//!
//! # Numeric semantics
//!
//! Per-token returns are percentages, `(end - start) / start * 100`,
//! computed in `Decimal` at full precision. Rounding happens exactly once,
//! with banker's rounding at the configured precision, after the team's
//! returns are aggregated. Rounding per token would let drift accumulate
//! across a large roster.
//!
//! A pick that cannot be priced at both ends of the window contributes
//! zero and marks the record `partial`. With the `Average` aggregate the
//! divisor stays the full roster size, so a team never profits from a
//! delisted pick.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use chrono::Utc;
//! use moonliga::domain::{
//!     CompetitionId, PriceSnapshot, ScoringPolicy, SnapshotPhase, Symbol, Team, UserId,
//! };
//! use rust_decimal_macros::dec;
//!
//! let competition = CompetitionId::from("c1");
//! let start = PriceSnapshot::from_parts(
//!     competition.clone(),
//!     SnapshotPhase::Start,
//!     BTreeMap::from([(Symbol::new("BTC"), dec!(100))]),
//!     Utc::now(),
//! );
//! let end = PriceSnapshot::from_parts(
//!     competition.clone(),
//!     SnapshotPhase::End,
//!     BTreeMap::from([(Symbol::new("BTC"), dec!(110))]),
//!     Utc::now(),
//! );
//! let team = Team {
//!     competition_id: competition,
//!     user_id: UserId::new("u1"),
//!     name: "Solo".to_string(),
//!     symbols: vec![Symbol::new("BTC")],
//!     registered_at: Utc::now(),
//! };
//!
//! let records = moonliga::domain::score_teams(&start, &end, &[team], &ScoringPolicy::default());
//! assert_eq!(records[0].score, dec!(10));
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::id::{CompetitionId, UserId};
use super::quote::Price;
use super::snapshot::PriceSnapshot;
use super::team::Team;

/// How a team's per-token returns combine into one score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// Sum of per-token percentage returns.
    #[default]
    Sum,
    /// Sum divided by the roster size, unpriceable picks included.
    Average,
}

/// Scoring knobs supplied by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Aggregate function over per-token returns.
    #[serde(default)]
    pub aggregate: Aggregate,
    /// Decimal places of the final score.
    #[serde(default = "default_score_precision")]
    pub precision: u32,
}

fn default_score_precision() -> u32 {
    4
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            aggregate: Aggregate::default(),
            precision: default_score_precision(),
        }
    }
}

/// One team's derived outcome for a competition.
///
/// Produced unranked by [`score_teams`]; the ranking resolver fills in
/// `rank` and `prize` afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Competition the record belongs to.
    pub competition_id: CompetitionId,
    /// Team owner.
    pub user_id: UserId,
    /// Aggregated percentage return, rounded per the scoring policy.
    pub score: Decimal,
    /// True when at least one pick was missing from a snapshot.
    pub partial: bool,
    /// 1-based position after ranking. `None` until ranked.
    pub rank: Option<u32>,
    /// Prize amount awarded, zero until allocation.
    pub prize: Decimal,
}

/// Percentage return of a single token across the window.
///
/// Returns `None` when the start price cannot anchor a return. Snapshot
/// capture already drops non-positive prices, so this only guards
/// hand-built snapshots.
#[must_use]
pub fn token_return(start: Price, end: Price) -> Option<Decimal> {
    if start <= Decimal::ZERO {
        return None;
    }
    Some((end - start) / start * Decimal::ONE_HUNDRED)
}

/// Score a single team across the window.
#[must_use]
pub fn score_team(
    start: &PriceSnapshot,
    end: &PriceSnapshot,
    team: &Team,
    policy: &ScoringPolicy,
) -> ScoreRecord {
    let mut total = Decimal::ZERO;
    let mut partial = false;

    for symbol in &team.symbols {
        match (start.price(symbol), end.price(symbol)) {
            (Some(start_price), Some(end_price)) => {
                match token_return(start_price, end_price) {
                    Some(ret) => total += ret,
                    None => partial = true,
                }
            }
            _ => partial = true,
        }
    }

    let raw = match policy.aggregate {
        Aggregate::Sum => total,
        Aggregate::Average => {
            if team.symbols.is_empty() {
                Decimal::ZERO
            } else {
                total / Decimal::from(team.symbols.len())
            }
        }
    };

    ScoreRecord {
        competition_id: team.competition_id.clone(),
        user_id: team.user_id.clone(),
        score: raw.round_dp_with_strategy(policy.precision, RoundingStrategy::MidpointNearestEven),
        partial,
        rank: None,
        prize: Decimal::ZERO,
    }
}

/// Score every registered team. Output order follows input order; ranking
/// is a separate step.
#[must_use]
pub fn score_teams(
    start: &PriceSnapshot,
    end: &PriceSnapshot,
    teams: &[Team],
    policy: &ScoringPolicy,
) -> Vec<ScoreRecord> {
    teams
        .iter()
        .map(|team| score_team(start, end, team, policy))
        .collect()
}
