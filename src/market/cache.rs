//! TTL cache with single-flight refresh in front of the market source.
//!
//! The upstream is rate-limited and slow, so every read goes through this
//! cache. Three rules govern it:
//!
//! - **Freshness**: a value younger than the TTL is served directly.
//! - **Single-flight**: when a value is missing or expired, exactly one
//!   caller per key performs the refresh; concurrent callers wait on the
//!   same per-key lock and then read the value the winner installed.
//! - **Stale fallback**: when a refresh fails but an older value exists,
//!   the older value is served flagged as stale instead of failing the
//!   caller. Only a cold cache propagates the upstream error.
//!
//! Entries are replaced wholesale on refresh, never mutated in place, so
//! readers always observe a consistent quote list. Refreshes run under a
//! deadline; a hung upstream degrades to the stale policy rather than
//! blocking callers.
//!
//! Snapshots never pass through here. They are immutable once captured
//! and have no freshness dimension.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use super::source::MarketDataSource;
use crate::domain::TokenQuote;
use crate::error::MarketDataError;

/// Cache key classes.
///
/// Each class carries its own identity in the map; today the only live
/// class is the ranked top-N list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarketKey {
    /// Top `limit` tokens by market cap.
    Top { limit: usize },
}

impl MarketKey {
    /// Upstream fetch size for this key.
    #[must_use]
    pub fn limit(&self) -> usize {
        match self {
            MarketKey::Top { limit } => *limit,
        }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKey::Top { limit } => write!(f, "top:{limit}"),
        }
    }
}

/// Freshness policy for a cache key class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a fetched value stays fresh.
    pub ttl: Duration,
    /// Deadline for one refresh attempt, retries inside the source
    /// included.
    pub refresh_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

/// A cache read result.
#[derive(Debug, Clone)]
pub struct CachedQuotes {
    /// Shared quote list, ordered by market cap rank.
    pub quotes: Arc<Vec<TokenQuote>>,
    /// Time since the producing fetch completed.
    pub age: Duration,
    /// True when the value outlived its TTL or was invalidated, and was
    /// served anyway because the refresh failed.
    pub stale: bool,
}

#[derive(Clone)]
struct CacheEntry {
    quotes: Arc<Vec<TokenQuote>>,
    fetched_at: Instant,
    invalidated: bool,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.fetched_at)
    }

    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        !self.invalidated && self.age(now) < ttl
    }
}

/// Read-only view of one cache entry for the diagnostics surface.
#[derive(Debug, Clone, Serialize)]
pub struct EntryMetadata {
    /// Rendered key, e.g. `top:100`.
    pub key: String,
    /// Seconds since the entry was fetched.
    pub age_secs: u64,
    /// Whether a `get` right now would be served from this entry.
    pub fresh: bool,
    /// Number of quotes held.
    pub quote_count: usize,
}

/// Aggregate counters plus per-entry state, for the admin view.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetadata {
    /// Per-entry state.
    pub entries: Vec<EntryMetadata>,
    /// Reads served from a fresh entry.
    pub hits: u64,
    /// Reads that had to attempt an upstream fetch.
    pub misses: u64,
    /// Failed refreshes that fell back to a stale value.
    pub stale_serves: u64,
    /// Successful upstream fetches.
    pub refreshes: u64,
}

impl CacheMetadata {
    /// Fraction of reads served without upstream work.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe market data cache.
///
/// One instance is constructed at process start and shared via `Arc`;
/// there is no ambient singleton.
pub struct MarketCache {
    source: Arc<dyn MarketDataSource>,
    policy: CachePolicy,
    entries: DashMap<MarketKey, CacheEntry>,
    refresh_locks: DashMap<MarketKey, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_serves: AtomicU64,
    refreshes: AtomicU64,
}

impl MarketCache {
    /// Create a cache over `source` with the given freshness policy.
    #[must_use]
    pub fn new(source: Arc<dyn MarketDataSource>, policy: CachePolicy) -> Self {
        Self {
            source,
            policy,
            entries: DashMap::new(),
            refresh_locks: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_serves: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Serve quotes for `key`, refreshing at most once per key at a time.
    pub async fn get(&self, key: MarketKey) -> Result<CachedQuotes, MarketDataError> {
        if let Some(served) = self.read_fresh(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(served);
        }

        // Slow path: serialize refreshes per key. Latecomers block here
        // and usually find the entry fresh once the winner finishes.
        let lock = self.refresh_lock(&key);
        let _guard = lock.lock().await;

        if let Some(served) = self.read_fresh(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(served);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        match self.refresh(&key).await {
            Ok(quotes) => Ok(CachedQuotes {
                quotes,
                age: Duration::ZERO,
                stale: false,
            }),
            Err(err) => match self.read_any(&key) {
                Some(mut served) => {
                    self.stale_serves.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %err, "refresh failed, serving stale quotes");
                    served.stale = true;
                    Ok(served)
                }
                None => Err(err),
            },
        }
    }

    /// Top-of-market quotes, the common read path.
    pub async fn get_market_tokens(&self, limit: usize) -> Result<CachedQuotes, MarketDataError> {
        self.get(MarketKey::Top { limit }).await
    }

    /// Force the next `get` for `key` to refresh regardless of TTL.
    ///
    /// The current value is kept as a stale fallback, it just stops
    /// counting as fresh.
    pub fn invalidate(&self, key: &MarketKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.invalidated = true;
            debug!(key = %key, "cache entry invalidated");
        }
        // A strong count of 1 means only the map holds the lock; an
        // in-flight refresher always holds its own clone.
        self.refresh_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Invalidate every entry at once.
    pub fn invalidate_all(&self) {
        self.entries.alter_all(|_, mut entry| {
            entry.invalidated = true;
            entry
        });
        self.refresh_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        debug!("all cache entries invalidated");
    }

    /// Diagnostics view: per-entry age and freshness plus counters.
    #[must_use]
    pub fn metadata(&self) -> CacheMetadata {
        let now = Instant::now();
        let entries = self
            .entries
            .iter()
            .map(|item| EntryMetadata {
                key: item.key().to_string(),
                age_secs: item.value().age(now).as_secs(),
                fresh: item.value().is_fresh(now, self.policy.ttl),
                quote_count: item.value().quotes.len(),
            })
            .collect();

        CacheMetadata {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }

    fn read_fresh(&self, key: &MarketKey) -> Option<CachedQuotes> {
        let entry = self.entries.get(key)?;
        let now = Instant::now();
        if !entry.is_fresh(now, self.policy.ttl) {
            return None;
        }
        Some(CachedQuotes {
            quotes: Arc::clone(&entry.quotes),
            age: entry.age(now),
            stale: false,
        })
    }

    fn read_any(&self, key: &MarketKey) -> Option<CachedQuotes> {
        let entry = self.entries.get(key)?;
        let now = Instant::now();
        Some(CachedQuotes {
            quotes: Arc::clone(&entry.quotes),
            age: entry.age(now),
            stale: false,
        })
    }

    fn refresh_lock(&self, key: &MarketKey) -> Arc<Mutex<()>> {
        self.refresh_locks.entry(key.clone()).or_default().clone()
    }

    async fn refresh(&self, key: &MarketKey) -> Result<Arc<Vec<TokenQuote>>, MarketDataError> {
        let started = Instant::now();
        let fetch = self.source.fetch_top_tokens(key.limit());
        let fetched = match timeout(self.policy.refresh_timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(MarketDataError::Unavailable {
                    reason: format!(
                        "refresh timed out after {}ms",
                        self.policy.refresh_timeout.as_millis()
                    ),
                })
            }
        };

        let quotes = Arc::new(fetched);
        self.entries.insert(
            key.clone(),
            CacheEntry {
                quotes: Arc::clone(&quotes),
                fetched_at: Instant::now(),
                invalidated: false,
            },
        );
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        debug!(
            key = %key,
            count = quotes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            source = self.source.source_name(),
            "cache refreshed"
        );
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::testkit::market::ScriptedMarketSource;
    use crate::testkit::quotes;

    fn cache_with(source: ScriptedMarketSource, ttl_secs: u64) -> MarketCache {
        MarketCache::new(
            Arc::new(source),
            CachePolicy {
                ttl: Duration::from_secs(ttl_secs),
                refresh_timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn serves_cached_value_within_ttl() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100))]))
            .push_quotes(quotes(&[("BTC", dec!(200))]));
        let cache = cache_with(source, 60);
        let key = MarketKey::Top { limit: 100 };

        let first = cache.get(key.clone()).await.unwrap();
        assert_eq!(first.quotes[0].price, dec!(100));

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = cache.get(key).await.unwrap();
        assert_eq!(second.quotes[0].price, dec!(100));
        assert!(!second.stale);

        let meta = cache.metadata();
        assert_eq!(meta.refreshes, 1);
        assert_eq!(meta.hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_after_ttl_expiry() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100))]))
            .push_quotes(quotes(&[("BTC", dec!(200))]));
        let cache = cache_with(source, 60);
        let key = MarketKey::Top { limit: 100 };

        cache.get(key.clone()).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let second = cache.get(key).await.unwrap();
        assert_eq!(second.quotes[0].price, dec!(200));
        assert_eq!(cache.metadata().refreshes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refresh_before_ttl() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100))]))
            .push_quotes(quotes(&[("BTC", dec!(200))]));
        let cache = cache_with(source, 3600);
        let key = MarketKey::Top { limit: 100 };

        cache.get(key.clone()).await.unwrap();
        cache.invalidate(&key);

        let second = cache.get(key).await.unwrap();
        assert_eq!(second.quotes[0].price, dec!(200));
        assert!(!second.stale);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_serves_stale_value() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100))]))
            .push_error(MarketDataError::Unavailable {
                reason: "boom".to_string(),
            });
        let cache = cache_with(source, 60);
        let key = MarketKey::Top { limit: 100 };

        cache.get(key.clone()).await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;

        let served = cache.get(key).await.unwrap();
        assert!(served.stale);
        assert_eq!(served.quotes[0].price, dec!(100));
        assert_eq!(cache.metadata().stale_serves, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_cache_propagates_refresh_failure() {
        let source = ScriptedMarketSource::new().push_error(MarketDataError::Unavailable {
            reason: "down".to_string(),
        });
        let cache = cache_with(source, 60);

        let err = cache.get(MarketKey::Top { limit: 100 }).await.unwrap_err();
        assert!(matches!(err, MarketDataError::Unavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidated_entry_still_usable_as_stale_fallback() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100))]))
            .push_error(MarketDataError::RateLimited {
                retry_after_secs: Some(30),
            });
        let cache = cache_with(source, 3600);
        let key = MarketKey::Top { limit: 100 };

        cache.get(key.clone()).await.unwrap();
        cache.invalidate(&key);

        let served = cache.get(key).await.unwrap();
        assert!(served.stale);
        assert_eq!(served.quotes[0].price, dec!(100));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_prunes_idle_refresh_locks() {
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100))]))
            .push_quotes(quotes(&[("ETH", dec!(10))]))
            .push_quotes(quotes(&[("BTC", dec!(110))]));
        let cache = cache_with(source, 3600);

        cache.get(MarketKey::Top { limit: 10 }).await.unwrap();
        cache.get(MarketKey::Top { limit: 50 }).await.unwrap();
        assert_eq!(cache.refresh_locks.len(), 2);

        cache.invalidate(&MarketKey::Top { limit: 10 });
        assert_eq!(cache.refresh_locks.len(), 1);

        cache.invalidate_all();
        assert!(cache.refresh_locks.is_empty());

        // A pruned lock is recreated on the next refresh.
        let served = cache.get(MarketKey::Top { limit: 10 }).await.unwrap();
        assert!(!served.stale);
        assert_eq!(served.quotes[0].price, dec!(110));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_deadline_expires_on_hung_source() {
        // 30s of scripted delay against a 5s refresh timeout: the deadline
        // fires, and with a cold cache there is nothing to fall back to.
        let source = ScriptedMarketSource::new()
            .push_quotes(quotes(&[("BTC", dec!(100))]))
            .with_delay(Duration::from_secs(30));
        let cache = cache_with(source, 60);

        let err = cache.get(MarketKey::Top { limit: 100 }).await.unwrap_err();
        assert!(matches!(err, MarketDataError::Unavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_reports_entry_age_and_counts() {
        let source =
            ScriptedMarketSource::new().push_quotes(quotes(&[("BTC", dec!(100)), ("ETH", dec!(10))]));
        let cache = cache_with(source, 60);
        let key = MarketKey::Top { limit: 100 };

        cache.get(key.clone()).await.unwrap();
        cache.get(key).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        let meta = cache.metadata();
        assert_eq!(meta.entries.len(), 1);
        assert_eq!(meta.entries[0].key, "top:100");
        assert_eq!(meta.entries[0].quote_count, 2);
        assert_eq!(meta.entries[0].age_secs, 10);
        assert_eq!(meta.hits, 1);
        assert_eq!(meta.misses, 1);
        assert!(meta.hit_rate() > 0.49 && meta.hit_rate() < 0.51);
    }
}
