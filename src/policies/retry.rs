//! # Retry policy for rate-limited deliveries.
//!
//! [`RetryPolicy`] bounds how many times one item is sent and picks the wait
//! before each retry: the frontend's advertised `retry_after` when present,
//! otherwise the fallback [`BackoffPolicy`].
//!
//! ```text
//! attempt 1 ── rate limited (retry_after=5s) ──► wait 5s
//! attempt 2 ── rate limited (no hint)        ──► wait backoff.next(1)
//! attempt 3 ── ok                            ──► done
//! ```

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Attempt ceiling plus fallback delay schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of send attempts per item, including the first (min 1).
    pub max_attempts: u32,
    /// Delay used when the error carries no retry-after hint.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// 4 attempts with [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Attempt ceiling clamped to a minimum of 1.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// True if another attempt is allowed after `attempt` (1-based) failed.
    #[inline]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }

    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(d) => d,
            None => self.backoff.next(attempt.saturating_sub(1)),
        }
    }
}
