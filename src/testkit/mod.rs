//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`market`]: mock [`MarketDataSource`](crate::market::MarketDataSource)
//!   implementations, chiefly `ScriptedMarketSource`.
//! - [`domain`]: builders for domain primitives such as quotes, leagues,
//!   competitions and teams.

pub mod domain;
pub mod market;

pub use domain::{competition, league, quote, quotes, team};
pub use market::ScriptedMarketSource;
