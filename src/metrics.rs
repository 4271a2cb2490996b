//! # Run metrics.
//!
//! Atomic counters for the feed engine and the delivery pipeline. One
//! [`RunMetrics`] is created by [`RunContext::root`](crate::RunContext::root)
//! and shared by every descendant through `ctx.metrics()`; nothing is global.
//!
//! All counters use relaxed ordering. Values are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by a run tree.
#[derive(Debug, Default)]
pub struct RunMetrics {
    fetches: AtomicU64,
    fetch_errors: AtomicU64,
    batches_published: AtomicU64,
    items_delivered: AtomicU64,
    delivery_retries: AtomicU64,
    delivery_failures: AtomicU64,
}

impl RunMetrics {
    /// All counters at zero.
    #[inline]
    pub const fn new() -> Self {
        Self {
            fetches: AtomicU64::new(0),
            fetch_errors: AtomicU64::new(0),
            batches_published: AtomicU64::new(0),
            items_delivered: AtomicU64::new(0),
            delivery_retries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    /// A feeder fetch finished; `ok = false` also counts a fetch error.
    #[inline]
    pub fn record_fetch(&self, ok: bool) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.fetch_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A non-empty content batch was published.
    #[inline]
    pub fn record_batch(&self) {
        self.batches_published.fetch_add(1, Ordering::Relaxed);
    }

    /// An item reached the frontend.
    #[inline]
    pub fn record_delivered(&self) {
        self.items_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// A rate-limited send is about to be retried.
    #[inline]
    pub fn record_retry(&self) {
        self.delivery_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// An item was dropped after a hard failure or exhausted retries.
    #[inline]
    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
            items_delivered: self.items_delivered.load(Ordering::Relaxed),
            delivery_retries: self.delivery_retries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of [`RunMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub fetches: u64,
    pub fetch_errors: u64,
    pub batches_published: u64,
    pub items_delivered: u64,
    pub delivery_retries: u64,
    pub delivery_failures: u64,
}
