//! Retry and backoff policies.
//!
//! This module groups the knobs that control **how often** a failed delivery
//! is retried and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`]   attempt ceiling plus the fallback backoff
//! - [`BackoffPolicy`] how fallback delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! DeliveryConfig { retry: RetryPolicy, content_buffer }
//!      └─► delivery::DeliveryPipeline uses:
//!           - retry.max_attempts to stop retrying a rate-limited item
//!           - retry.delay(attempt, retry_after) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → 4 attempts, exponential fallback.
//! - `BackoffPolicy::default()` → first=100ms, factor=2.0, max=30s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
