//! Moonliga - Cached market data and time-boxed token-picking competitions.
//!
//! This crate provides the engine behind fantasy crypto leagues: users
//! register rosters of tokens into a competition, prices are snapshotted
//! when the competition starts and ends, and teams are scored, ranked,
//! and paid by percentage-of-return over the window.
//!
//! # Architecture
//!
//! Market data flows through a read-through cache so that concurrent
//! reads and snapshots share one upstream fetch:
//!
//! - **`market`** - The `MarketDataSource` port, the single-flight
//!   `MarketCache` in front of it, and the CoinGecko adapter behind it
//! - **`domain`** - Storage-agnostic types and pure scoring, ranking,
//!   and prize allocation
//! - **`store`** - Persistence traits and the in-memory implementation
//! - **`engine`** - The competition lifecycle controller and the sweep
//!   scheduler that drives scheduled transitions
//!
//! Lifecycle idempotency rests on two store primitives: at-most-once
//! snapshot capture and compare-and-set status transitions. Concurrent
//! or crash-resumed start/end attempts converge on one result.
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML files
//! - [`domain`] - Leagues, competitions, teams, quotes, scoring, prizes
//! - [`engine`] - Start/end orchestration and the scheduler
//! - [`error`] - Error types for the crate
//! - [`market`] - Quote fetching and caching
//! - [`store`] - Persistence traits and `MemoryStore`
//!
//! # Features
//!
//! - `testkit` - Scripted market sources and domain fixtures for tests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use moonliga::config::Config;
//! use moonliga::engine::CompetitionEngine;
//! use moonliga::market::{CoinGeckoSource, MarketCache};
//! use moonliga::store::MemoryStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.toml")?;
//! let source = Arc::new(CoinGeckoSource::from_config(&config.market));
//! let cache = Arc::new(MarketCache::new(source, config.cache.policy()));
//! let store = Arc::new(MemoryStore::new());
//! let engine = CompetitionEngine::new(store, cache, config.rules());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod market;
pub mod store;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
