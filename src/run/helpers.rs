//! # Loop helpers for tasks spawned with [`RunContext::go`](crate::RunContext::go).
//!
//! All helpers stop with [`RunError::Canceled`] as soon as the given token is
//! cancelled, which `go` treats as a silent exit.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::RunError;

/// Sleeps for `d` unless `token` is cancelled first.
pub async fn sleep(token: &CancellationToken, d: Duration) -> Result<(), RunError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RunError::Canceled),
        _ = tokio::time::sleep(d) => Ok(()),
    }
}

/// Runs `f` after `run_after`, then every `interval` until cancelled.
///
/// A failed run is logged and the next wait is halved, so a broken refresh is
/// retried sooner than a healthy one.
pub async fn periodically<F, Fut>(
    token: CancellationToken,
    run_after: Duration,
    interval: Duration,
    mut f: F,
) -> Result<(), RunError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), RunError>>,
{
    let mut wait = run_after;
    loop {
        sleep(&token, wait).await?;
        wait = interval;
        if let Err(e) = f(token.clone()).await {
            wait /= 2;
            error!(error = %e, "periodic handler failed");
        }
    }
}

/// Runs `f` on every wall-clock multiple of `interval` (`:00`, `:15`, ... for
/// 15 minutes) until cancelled. Failures are logged; the schedule is kept.
pub async fn on_interval<F, Fut>(token: CancellationToken, interval: Duration, mut f: F) -> Result<(), RunError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), RunError>>,
{
    loop {
        sleep(&token, until_next_boundary(Utc::now(), interval)).await?;
        if let Err(e) = f(token.clone()).await {
            error!(error = %e, "interval handler failed");
        }
    }
}

/// Time from `now` to the next multiple of `interval` since the Unix epoch.
/// A `now` already on a boundary waits a full interval.
fn until_next_boundary(now: DateTime<Utc>, interval: Duration) -> Duration {
    let step = interval.max(Duration::from_millis(1)).as_nanos() as i128;
    let nanos = i128::from(now.timestamp()) * 1_000_000_000 + i128::from(now.timestamp_subsec_nanos());
    let wait = step - nanos.rem_euclid(step);
    Duration::from_nanos(u64::try_from(wait).unwrap_or(u64::MAX))
}

/// Re-runs `f` until it succeeds, fails fatally, or `token` is cancelled.
///
/// On a recoverable failure `f` returns the error together with how long to
/// wait before the next run.
pub async fn retry<F, Fut>(token: CancellationToken, mut f: F) -> Result<(), RunError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), (Duration, RunError)>>,
{
    loop {
        match f(token.clone()).await {
            Ok(()) => return Ok(()),
            Err((_, e)) if e.is_fatal() || e.is_canceled() => return Err(e),
            Err((after, e)) => {
                error!(error = %e, retry_after = ?after, "retry handler failed");
                sleep(&token, after).await?;
            }
        }
    }
}
