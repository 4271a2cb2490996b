//! # Runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the feed engine, the dedup
//! helper and the delivery pipeline.
//!
//! Config is used in three places:
//! 1. **Feed engine**: `FeedEngine::new(feeder, store, content, config.feed)`
//! 2. **Dedup**: `SeenFilter::new(store, "rss", config.dedup)`
//! 3. **Delivery**: `DeliveryPipeline::new(sub, deliver, config.delivery)`
//!
//! ## Sentinel values
//! - `feed.default_interval` also replaces a zero interval coming from a command or a record
//! - `delivery.content_buffer = 0` → capacity 1 (tokio channels cannot be unbuffered)

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Top-level configuration.
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sprinkling sentinel
/// checks across the codebase.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Subscription scheduling and command rendering.
    pub feed: FeedConfig,
    /// Seen-item suppression.
    pub dedup: DedupConfig,
    /// Outbound send retries and the pipeline's content buffer.
    pub delivery: DeliveryConfig,
}

/// Feed engine settings.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Interval used when a command or record does not carry one.
    pub default_interval: Duration,
    /// Smallest interval a user may request.
    pub min_interval: Duration,
    /// Largest interval a user may request; also caps stored intervals when polling.
    pub max_interval: Duration,
    /// Maximum characters per `list` message.
    pub list_chunk_limit: usize,
}

impl FeedConfig {
    /// Replaces an unset or zero interval with [`FeedConfig::default_interval`].
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use feedvisor::FeedConfig;
    ///
    /// let cfg = FeedConfig::default();
    /// assert_eq!(cfg.effective_interval(None), Duration::from_secs(24 * 3600));
    /// assert_eq!(cfg.effective_interval(Some(Duration::ZERO)), Duration::from_secs(24 * 3600));
    /// assert_eq!(cfg.effective_interval(Some(Duration::from_secs(5400))), Duration::from_secs(5400));
    /// ```
    #[inline]
    pub fn effective_interval(&self, interval: Option<Duration>) -> Duration {
        match interval {
            Some(d) if !d.is_zero() => d,
            _ => self.default_interval,
        }
    }

    /// Poll period for `interval`, kept within `1ms..=max_interval`.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use feedvisor::FeedConfig;
    ///
    /// let cfg = FeedConfig::default();
    /// assert_eq!(cfg.poll_period(Duration::ZERO), Duration::from_millis(1));
    /// assert_eq!(cfg.poll_period(Duration::MAX), cfg.max_interval);
    /// ```
    #[inline]
    pub fn poll_period(&self, interval: Duration) -> Duration {
        interval.min(self.max_interval).max(Duration::from_millis(1))
    }

    /// Chunk limit clamped to a minimum of 1.
    #[inline]
    pub fn list_chunk_limit_clamped(&self) -> usize {
        self.list_chunk_limit.max(1)
    }
}

impl Default for FeedConfig {
    /// - `default_interval = 24h`
    /// - `min_interval = 60m`
    /// - `max_interval = 365d`
    /// - `list_chunk_limit = 1000`
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(24 * 60 * 60),
            min_interval: Duration::from_secs(60 * 60),
            max_interval: Duration::from_secs(365 * 24 * 60 * 60),
            list_chunk_limit: 1000,
        }
    }
}

/// Seen-item suppression settings.
#[derive(Clone, Debug)]
pub struct DedupConfig {
    /// Items published longer ago than this count as already seen.
    pub staleness: Duration,
    /// How long a seen marker is kept in the store.
    pub ttl: Duration,
}

impl Default for DedupConfig {
    /// - `staleness = 24h`
    /// - `ttl = 7d`
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(24 * 60 * 60),
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Delivery pipeline settings.
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// Retry ceiling and fallback backoff for rate-limited sends.
    pub retry: RetryPolicy,
    /// Buffer of the pipeline's blocking content subscription (`0` = capacity 1).
    pub content_buffer: usize,
}

impl DeliveryConfig {
    /// Content buffer clamped to a minimum of 1.
    #[inline]
    pub fn content_buffer_clamped(&self) -> usize {
        self.content_buffer.max(1)
    }
}

impl Default for DeliveryConfig {
    /// - `retry = RetryPolicy::default()`
    /// - `content_buffer = 16`
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            content_buffer: 16,
        }
    }
}
