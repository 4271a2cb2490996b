//! # Throttling publisher.
//!
//! [`Throttle`] sits in front of another publisher and coalesces bursts:
//!
//! ```text
//! send(a) ─ send(b) ─ send(c) ──── period of silence ────► inner.send(merge(merge(a, b), c))
//!    └─ timer reset ┘─ timer reset ┘
//! ```
//!
//! Every update restarts the timer, so a value is only forwarded once `period`
//! passes without another update. Without a merger the latest value wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use crate::error::RunError;
use crate::psub::publish::Publish;

type Merger<T> = Box<dyn FnMut(T, T) -> T + Send>;

/// Debouncing wrapper around a publisher.
pub struct Throttle<T> {
    tx: mpsc::Sender<T>,
    inner: Arc<dyn Publish<T>>,
}

impl<T: Send + 'static> Throttle<T> {
    /// Forwards the latest value after `period` of silence.
    ///
    /// The background listener stops when `token` is cancelled; a pending value
    /// is discarded then.
    pub fn new<P>(token: &CancellationToken, inner: P, period: Duration) -> Self
    where
        P: Publish<T> + 'static,
    {
        Self::spawn(token, Arc::new(inner), period, Box::new(|_: T, latest: T| latest))
    }

    /// Like [`Throttle::new`], folding a burst with `merger(pending, update)`.
    pub fn with_merger<P, M>(token: &CancellationToken, inner: P, period: Duration, merger: M) -> Self
    where
        P: Publish<T> + 'static,
        M: FnMut(T, T) -> T + Send + 'static,
    {
        Self::spawn(token, Arc::new(inner), period, Box::new(merger))
    }

    fn spawn(token: &CancellationToken, inner: Arc<dyn Publish<T>>, period: Duration, merger: Merger<T>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let span = tracing::debug_span!("task", name = "throttle");
        tokio::spawn(listen(token.clone(), rx, inner.clone(), period, merger).instrument(span));
        Self { tx, inner }
    }
}

async fn listen<T: Send + 'static>(
    token: CancellationToken,
    mut rx: mpsc::Receiver<T>,
    inner: Arc<dyn Publish<T>>,
    period: Duration,
    mut merger: Merger<T>,
) {
    loop {
        let mut pending = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            first = rx.recv() => match first {
                Some(first) => first,
                None => return,
            },
        };

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                update = rx.recv() => match update {
                    Some(update) => pending = merger(pending, update),
                    None => {
                        if let Err(e) = inner.send_data(&token, pending).await {
                            debug!(error = %e, "final throttled value not forwarded");
                        }
                        return;
                    }
                },
                _ = tokio::time::sleep(period) => {
                    if let Err(e) = inner.send_data(&token, pending).await {
                        debug!(error = %e, "throttled value not forwarded");
                    }
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Publish<T> for Throttle<T> {
    async fn send_data(&self, token: &CancellationToken, data: T) -> Result<(), RunError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(RunError::Canceled),
            res = self.tx.send(data) => res.map_err(|_| RunError::Closed { name: "throttle".into() }),
        }
    }

    fn send_error(&self, err: RunError) {
        self.inner.send_error(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psub::{Subscription, SubscriptionOptions};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_merged_after_quiet_period() {
        let token = CancellationToken::new();
        let (mut sub, publisher) = Subscription::<Vec<u32>>::new(
            &token,
            SubscriptionOptions::new().with_buffer(4).with_blocking(true),
        );
        let throttle = Throttle::with_merger(&token, publisher, Duration::from_millis(100), |mut a: Vec<u32>, b| {
            a.extend(b);
            a
        });

        let start = Instant::now();
        for i in 0..3 {
            throttle.send_data(&token, vec![i]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        assert_eq!(sub.recv().await.unwrap(), vec![0, 1, 2]);
        assert!(start.elapsed() >= Duration::from_millis(160));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_wins_without_merger() {
        let token = CancellationToken::new();
        let (mut sub, publisher) = Subscription::<u32>::new(
            &token,
            SubscriptionOptions::new().with_buffer(4).with_blocking(true),
        );
        let throttle = Throttle::new(&token, publisher, Duration::from_millis(50));

        throttle.send_data(&token, 1).await.unwrap();
        throttle.send_data(&token, 2).await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        throttle.send_data(&token, 3).await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_value_flushed_when_throttle_dropped() {
        let token = CancellationToken::new();
        let (mut sub, publisher) = Subscription::<u32>::new(
            &token,
            SubscriptionOptions::new().with_buffer(4).with_blocking(true),
        );
        let throttle = Throttle::new(&token, publisher, Duration::from_secs(60));

        let start = Instant::now();
        throttle.send_data(&token, 7).await.unwrap();
        drop(throttle);

        assert_eq!(sub.recv().await.unwrap(), 7);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_send_error_reaches_inner() {
        let token = CancellationToken::new();
        let (mut sub, publisher) = Subscription::<u32>::new(&token, SubscriptionOptions::new());
        let throttle = Throttle::new(&token, publisher, Duration::from_millis(50));

        throttle.send_error(RunError::fatal("stop"));
        assert_eq!(sub.recv().await, Err(RunError::fatal("stop")));
    }
}
