//! Mock [`MarketDataSource`] implementations for testing.
//!
//! [`ScriptedMarketSource`] pops pre-loaded fetch results in order, so
//! tests can stage exact sequences of prices and failures without a
//! network: cache TTL rotation, stale fallback, refresh deadlines.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::TokenQuote;
use crate::error::MarketDataError;
use crate::market::MarketDataSource;

/// A mock source with a scripted queue of fetch results.
///
/// Each call to `fetch_top_tokens()` pops the next scripted result. An exhausted
/// script returns `Unavailable`, so a test that triggers more refreshes
/// than it staged fails loudly instead of silently reusing data.
pub struct ScriptedMarketSource {
    script: Mutex<VecDeque<Result<Vec<TokenQuote>, MarketDataError>>>,
    calls: Arc<AtomicU64>,
    delay: Option<Duration>,
}

impl ScriptedMarketSource {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Arc::new(AtomicU64::new(0)),
            delay: None,
        }
    }

    /// Queue a successful fetch result.
    #[must_use]
    pub fn push_quotes(self, quotes: Vec<TokenQuote>) -> Self {
        self.script.lock().push_back(Ok(quotes));
        self
    }

    /// Queue a failed fetch result.
    #[must_use]
    pub fn push_error(self, error: MarketDataError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Sleep this long inside every `fetch_top_tokens()` call.
    ///
    /// Under a paused tokio clock the sleep holds the fetch at its
    /// deadline, which is how tests exercise the refresh timeout.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared call counter, for asserting fetch counts after the source
    /// has been moved behind an `Arc`.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedMarketSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for ScriptedMarketSource {
    async fn fetch_top_tokens(&self, _limit: usize) -> Result<Vec<TokenQuote>, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| {
            Err(MarketDataError::Unavailable {
                reason: "scripted source exhausted".to_string(),
            })
        })
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}
