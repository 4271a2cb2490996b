//! # Fan-out broker.
//!
//! [`new_subscriber`] returns a [`Subscriber`] / [`Publisher`] pair sharing one
//! live set of subscriptions.
//!
//! ```text
//! Publisher::send_data(v)
//!   ├─ snapshot live set (lock held only for the copy)
//!   ├─► sub-1 ── blocking: wait for space | dropping: skip if full
//!   ├─► sub-2
//!   └─► sub-N
//!
//! Subscription done (cancel, parent cancel, error) ──► removed from live set
//! ```
//!
//! ## Rules
//! - Every subscription live at the time of a `send_data` call sees the value
//!   once; order per subscription equals publish order.
//! - Subscriptions that are already done are skipped.
//! - Cancelling the caller's token stops the fan-out and returns an error.
//! - `send_error` closes every live subscription with the given cause.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use crate::error::RunError;
use crate::psub::options::{generate_name, SubscriberOptions, SubscriptionOptions};
use crate::psub::publish::Publish;
use crate::psub::subscription::{Stop, Subscription, SubscriptionPublisher};

struct Shared<T> {
    name: String,
    defaults: SubscriptionOptions,
    next_id: AtomicU64,
    live: Mutex<BTreeMap<u64, SubscriptionPublisher<T>>>,
}

/// Subscribing side of a broker. Cheap to clone.
pub struct Subscriber<T> {
    shared: Arc<Shared<T>>,
}

/// Publishing side of a broker. Cheap to clone.
pub struct Publisher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Creates a broker.
///
/// # Example
/// ```
/// use feedvisor::{new_subscriber, Publish, SubscriberOptions, SubscriptionOptions};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancellationToken::new();
/// let (subscriber, publisher) = new_subscriber::<String>(
///     SubscriberOptions::new().with_name("content"),
/// );
///
/// let mut sub = subscriber.subscribe(&token, SubscriptionOptions::new().with_buffer(4));
/// publisher.send_data(&token, "hello".to_string()).await.unwrap();
/// assert_eq!(sub.recv().await.unwrap(), "hello");
/// # }
/// ```
pub fn new_subscriber<T>(opts: SubscriberOptions) -> (Subscriber<T>, Publisher<T>) {
    let shared = Arc::new(Shared {
        name: opts.name.unwrap_or_else(|| generate_name("subscriber")),
        defaults: opts.subscription,
        next_id: AtomicU64::new(1),
        live: Mutex::new(BTreeMap::new()),
    });
    (
        Subscriber {
            shared: shared.clone(),
        },
        Publisher { shared },
    )
}

impl<T: Send + 'static> Subscriber<T> {
    /// Adds a live subscription under `parent`.
    ///
    /// The subscription is named `"<subscriber>:sub-<id>"` unless `opts` names
    /// it. Fields set in `opts` override the subscriber's defaults.
    pub fn subscribe(&self, parent: &CancellationToken, opts: SubscriptionOptions) -> Subscription<T> {
        let shared = &self.shared;
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let opts = shared
            .defaults
            .merged(&SubscriptionOptions::new().with_name(format!("{}:sub-{}", shared.name, id)))
            .merged(&opts);

        let (sub, publisher) = Subscription::new(parent, opts);
        let done = publisher.done_token();
        shared.live.lock().insert(id, publisher);

        let weak = Arc::downgrade(shared);
        let span = tracing::debug_span!("task", name = %format!("{}@subscribe", sub.name()));
        tokio::spawn(
            async move {
                done.cancelled().await;
                if let Some(shared) = weak.upgrade() {
                    shared.live.lock().remove(&id);
                }
            }
            .instrument(span),
        );
        sub
    }
}

/// Source of subscriptions: a broker's [`Subscriber`] or several merged ones.
pub trait Subscribe<T>: Send + Sync {
    fn subscribe(&self, parent: &CancellationToken, opts: SubscriptionOptions) -> Subscription<T>;
}

impl<T: Send + 'static> Subscribe<T> for Subscriber<T> {
    fn subscribe(&self, parent: &CancellationToken, opts: SubscriptionOptions) -> Subscription<T> {
        Subscriber::subscribe(self, parent, opts)
    }
}

impl<T> Subscriber<T> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.shared.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Publisher<T> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    fn snapshot(&self) -> Vec<SubscriptionPublisher<T>> {
        self.shared.live.lock().values().cloned().collect()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Publish<T> for Publisher<T> {
    async fn send_data(&self, token: &CancellationToken, data: T) -> Result<(), RunError> {
        for target in self.snapshot() {
            match target.offer(token, data.clone()).await {
                Ok(()) => {}
                Err(Stop::Caller) => return Err(RunError::Canceled),
                Err(Stop::Closed(e)) => {
                    debug!(subscription = %target.name(), cause = e.as_label(), "skipped closed subscription");
                }
            }
        }
        Ok(())
    }

    fn send_error(&self, err: RunError) {
        for target in self.snapshot() {
            target.send_error(err.clone());
        }
    }
}
