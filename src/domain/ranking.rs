//! Ranking and prize allocation over scored records.
//!
//! Ordering must be total and reproducible: score descending, then
//! earliest registration, then user id. Iteration order of whatever map
//! the records came out of must never leak into ranks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::UserId;
use super::scoring::ScoreRecord;
use super::team::Team;

/// Payout curve validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurveError {
    #[error("payout share at rank {rank} is negative")]
    NegativeShare { rank: usize },

    #[error("payout shares sum to {total}%, exceeding 100%")]
    OverAllocated { total: Decimal },
}

/// Percentage shares of the prize pool per rank, best rank first.
///
/// Validated on construction: every share is non-negative and the total
/// stays within 100%. A curve shorter than the field simply leaves lower
/// ranks unpaid; a curve longer than the field leaves the tail shares
/// unused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Decimal>", into = "Vec<Decimal>")]
pub struct PayoutCurve(Vec<Decimal>);

impl PayoutCurve {
    /// Build a curve from per-rank percentage shares.
    pub fn new(shares: Vec<Decimal>) -> Result<Self, CurveError> {
        if let Some(rank) = shares.iter().position(|s| *s < Decimal::ZERO) {
            return Err(CurveError::NegativeShare { rank: rank + 1 });
        }
        let total: Decimal = shares.iter().sum();
        if total > Decimal::ONE_HUNDRED {
            return Err(CurveError::OverAllocated { total });
        }
        Ok(Self(shares))
    }

    /// Per-rank shares, best rank first.
    #[must_use]
    pub fn shares(&self) -> &[Decimal] {
        &self.0
    }

    /// Number of paid ranks.
    #[must_use]
    pub fn paid_ranks(&self) -> usize {
        self.0.len()
    }
}

impl TryFrom<Vec<Decimal>> for PayoutCurve {
    type Error = CurveError;

    fn try_from(shares: Vec<Decimal>) -> Result<Self, Self::Error> {
        Self::new(shares)
    }
}

impl From<PayoutCurve> for Vec<Decimal> {
    fn from(curve: PayoutCurve) -> Self {
        curve.0
    }
}

/// The standard 50/30/20 podium split.
impl Default for PayoutCurve {
    fn default() -> Self {
        Self(vec![dec!(50), dec!(30), dec!(20)])
    }
}

/// What happens to the fraction of the pool lost to round-down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualPolicy {
    /// Add the rounding residual to the rank-1 award.
    #[default]
    CarryToTop,
    /// Leave the residual in the pool.
    Undistributed,
}

/// Sort records into final order and assign 1-based ordinal ranks.
///
/// Ties on score break by earliest `registered_at` from `teams`, then by
/// user id so same-instant registrations still order deterministically.
#[must_use]
pub fn rank_records(mut records: Vec<ScoreRecord>, teams: &[Team]) -> Vec<ScoreRecord> {
    let registered: BTreeMap<&UserId, DateTime<Utc>> = teams
        .iter()
        .map(|team| (&team.user_id, team.registered_at))
        .collect();
    let registered_at = |record: &ScoreRecord| {
        registered
            .get(&record.user_id)
            .copied()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    };

    records.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| registered_at(a).cmp(&registered_at(b)))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    for (index, record) in records.iter_mut().enumerate() {
        record.rank = Some(index as u32 + 1);
    }
    records
}

/// Allocate prizes over ranked records.
///
/// Each paid rank gets `pool * share / 100` rounded *down* to `precision`
/// decimal places, so the awarded total can never exceed the pool. The
/// round-down residual goes wherever `policy` says. Records beyond the
/// curve get zero.
pub fn allocate_prizes(
    records: &mut [ScoreRecord],
    pool: Decimal,
    curve: &PayoutCurve,
    policy: ResidualPolicy,
    precision: u32,
) {
    for record in records.iter_mut() {
        record.prize = Decimal::ZERO;
    }

    let mut residual = Decimal::ZERO;
    for (record, share) in records.iter_mut().zip(curve.shares()) {
        let exact = pool * *share / Decimal::ONE_HUNDRED;
        let award = exact.round_dp_with_strategy(precision, RoundingStrategy::ToZero);
        record.prize = award;
        residual += exact - award;
    }

    if policy == ResidualPolicy::CarryToTop {
        if let Some(top) = records.first_mut() {
            top.prize += residual.round_dp_with_strategy(precision, RoundingStrategy::ToZero);
        }
    }
}
