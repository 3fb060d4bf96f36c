//! Request pacing for polite scraping.
//!
//! Wraps any [`PageSource`] so that consecutive wiki requests (listings and
//! page fetches alike) are spaced by at least a configured delay, no matter
//! how many fetch tasks share the source.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use harvest_core::throttle::{ThrottleConfig, ThrottledSource};
//! use harvest_core::traits::PageSource;
//!
//! fn polite<S: PageSource>(source: S) -> ThrottledSource<S> {
//!     let config = ThrottleConfig::new(Duration::from_millis(250))
//!         .with_jitter(Duration::from_millis(100));
//!     ThrottledSource::new(source, config)
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::{ListCursor, PageListing, PageTask};
use crate::traits::PageSource;
use crate::util::rand_jitter_ms;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum spacing between two requests.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter)).
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// No pacing at all.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        self.delay + Duration::from_millis(rand_jitter_ms(self.jitter.as_millis() as u64))
    }
}

impl Default for ThrottleConfig {
    /// 200ms between requests with 100ms jitter.
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(200),
            jitter: Duration::from_millis(100),
        }
    }
}

/// A [`PageSource`] that waits out the configured delay before each request.
///
/// Clones share the same clock, so the spacing holds across concurrent
/// fetch tasks.
#[derive(Clone)]
pub struct ThrottledSource<S> {
    inner: S,
    config: ThrottleConfig,
    /// Time slot reserved by the most recent request.
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl<S: PageSource> ThrottledSource<S> {
    pub fn new(inner: S, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Reserve the next request slot, then sleep until it arrives.
    ///
    /// The reservation happens under the lock and the sleep outside it, so
    /// concurrent callers queue up one delay apart instead of all waking at
    /// once.
    async fn wait_turn(&self) {
        if self.config.delay.is_zero() && self.config.jitter.is_zero() {
            return;
        }
        let now = Instant::now();
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.config.effective_delay());
            slot
        };
        if slot > now {
            let sleep_for = slot - now;
            tracing::debug!(sleep_ms = %sleep_for.as_millis(), "Throttling request");
            tokio::time::sleep(sleep_for).await;
        }
    }
}

impl<S: PageSource> PageSource for ThrottledSource<S> {
    async fn list_pages(&self, cursor: &ListCursor) -> Result<PageListing, AppError> {
        self.wait_turn().await;
        self.inner.list_pages(cursor).await
    }

    async fn fetch_page(&self, task: &PageTask) -> Result<String, AppError> {
        self.wait_turn().await;
        self.inner.fetch_page(task).await
    }
}
