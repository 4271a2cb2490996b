//! # Jitter for fallback retry delays.
//!
//! Several feeds can hit the same frontend rate limit at once; shortening each
//! fallback wait by a random fraction keeps their retries from landing together.
//! Jitter only ever shortens a delay, so [`BackoffPolicy::max`](crate::BackoffPolicy)
//! stays an upper bound.
//!
//! ```text
//! Full:  delay × (1 - r), r ∈ [0, 1]    ──► [0, delay]
//! Equal: delay × (1 - r), r ∈ [0, 0.5]  ──► [delay/2, delay]
//! ```
//!
//! An advertised `retry_after` is never jittered.

use std::time::Duration;

use rand::Rng;

/// Randomization applied to a computed fallback delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the computed delay as is.
    #[default]
    None,
    /// Anywhere between zero and the delay.
    Full,
    /// Between half the delay and the delay.
    Equal,
}

impl JitterPolicy {
    /// Largest fraction of a delay this policy may cut.
    pub fn spread(&self) -> f64 {
        match self {
            JitterPolicy::None => 0.0,
            JitterPolicy::Full => 1.0,
            JitterPolicy::Equal => 0.5,
        }
    }

    /// Applies jitter to `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        let spread = self.spread();
        if spread == 0.0 || delay.is_zero() {
            return delay;
        }
        let cut = rand::rng().random_range(0.0..=spread);
        delay.mul_f64(1.0 - cut)
    }
}
