//! # Single subscription: ordered channel plus a sticky cancellation cause.
//!
//! ```text
//! SubscriptionPublisher ──(mpsc, bounded)──► Subscription::recv()
//!          │                                       ▲
//!          └──── send_error(cause) ── ErrorDone ───┘   (done first, data second)
//! ```
//!
//! ## Rules
//! - Values arrive in publish order.
//! - Once done, `recv` only returns the cause; buffered values are not handed out.
//! - Dropping the [`Subscription`] cancels it.
//! - When every publisher is gone the subscription closes with
//!   [`RunError::Closed`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::RunError;
use crate::psub::done::ErrorDone;
use crate::psub::options::SubscriptionOptions;
use crate::psub::publish::Publish;

/// Receiving side of a subscription.
pub struct Subscription<T> {
    name: Arc<str>,
    rx: mpsc::Receiver<T>,
    done: Arc<ErrorDone>,
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("err", &self.done.err())
            .finish()
    }
}

impl<T> Subscription<T> {
    /// Creates a standalone subscription under `parent` and its publisher.
    pub fn new(
        parent: &CancellationToken,
        opts: SubscriptionOptions,
    ) -> (Subscription<T>, SubscriptionPublisher<T>) {
        let name: Arc<str> = opts.resolve_name().into();
        let (tx, rx) = mpsc::channel(opts.capacity());
        let done = Arc::new(ErrorDone::new(parent));

        let sub = Subscription {
            name: name.clone(),
            rx,
            done: done.clone(),
        };
        let publisher = SubscriptionPublisher {
            name,
            tx,
            done,
            blocking: opts.is_blocking(),
        };
        (sub, publisher)
    }

    /// Creates a subscription that is already closed with `err`.
    pub fn with_error(parent: &CancellationToken, err: RunError, opts: SubscriptionOptions) -> Self {
        let (sub, publisher) = Self::new(parent, opts);
        publisher.done.send_error(err);
        sub
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next value in publish order, or the cause once the subscription is done.
    pub async fn recv(&mut self) -> Result<T, RunError> {
        tokio::select! {
            biased;
            _ = self.done.token().cancelled() => Err(self.done.cause()),
            item = self.rx.recv() => match item {
                Some(data) => Ok(data),
                None => {
                    self.done.send_error(RunError::Closed { name: self.name.to_string() });
                    Err(self.done.cause())
                }
            },
        }
    }

    /// Token cancelled when this subscription is done; use it to derive
    /// subscriptions that must not outlive this one.
    pub fn token(&self) -> CancellationToken {
        self.done.token().clone()
    }

    /// Resolves once the subscription is done.
    pub async fn done(&self) {
        self.done.token().cancelled().await
    }

    pub fn is_done(&self) -> bool {
        self.done.is_done()
    }

    /// The cause, once done.
    pub fn err(&self) -> Option<RunError> {
        self.done.err()
    }

    /// Closes the subscription with [`RunError::Canceled`].
    pub fn cancel(&self) {
        self.done.send_error(RunError::Canceled);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Why a single delivery stopped.
pub(crate) enum Stop {
    /// The caller's token was cancelled.
    Caller,
    /// The subscription is done.
    Closed(RunError),
}

/// Publishing side of one subscription. Cheap to clone.
pub struct SubscriptionPublisher<T> {
    name: Arc<str>,
    tx: mpsc::Sender<T>,
    done: Arc<ErrorDone>,
    blocking: bool,
}

impl<T> Clone for SubscriptionPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
            done: self.done.clone(),
            blocking: self.blocking,
        }
    }
}

impl<T> SubscriptionPublisher<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_done(&self) -> bool {
        self.done.is_done()
    }

    pub(crate) fn done_token(&self) -> CancellationToken {
        self.done.token().clone()
    }

    /// Blocking mode waits for buffer space; dropping mode skips when full.
    pub(crate) async fn offer(&self, token: &CancellationToken, data: T) -> Result<(), Stop> {
        if token.is_cancelled() {
            return Err(Stop::Caller);
        }
        if self.done.is_done() {
            return Err(Stop::Closed(self.done.cause()));
        }

        if !self.blocking {
            return match self.tx.try_send(data) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    trace!(subscription = %self.name, "buffer full, value dropped");
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => Err(Stop::Closed(self.closed())),
            };
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Stop::Caller),
            _ = self.done.token().cancelled() => Err(Stop::Closed(self.done.cause())),
            res = self.tx.send(data) => res.map_err(|_| Stop::Closed(self.closed())),
        }
    }

    fn closed(&self) -> RunError {
        self.done.send_error(RunError::Closed {
            name: self.name.to_string(),
        });
        self.done.cause()
    }
}

#[async_trait]
impl<T: Send + 'static> Publish<T> for SubscriptionPublisher<T> {
    async fn send_data(&self, token: &CancellationToken, data: T) -> Result<(), RunError> {
        match self.offer(token, data).await {
            Ok(()) => Ok(()),
            Err(Stop::Caller) => Err(RunError::Canceled),
            Err(Stop::Closed(e)) => Err(e),
        }
    }

    fn send_error(&self, err: RunError) {
        self.done.send_error(err);
    }
}
