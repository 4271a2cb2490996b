//! # Merging N subscriptions into one.
//!
//! ```text
//! input-0 ──► fan-in task ──┐
//! input-1 ──► fan-in task ──┼──► (index, value | cause) ──► reducer ──► merged
//! input-N ──► fan-in task ──┘          mpsc
//! ```
//!
//! Each input gets its own forwarding task; values are tagged with the input's
//! index and land in one internal channel. The reducer sees the latest value of
//! every input (`None` until that input produced one) and decides whether to emit;
//! it may take values out to mark them consumed.
//!
//! ## Rules
//! - The first input that closes closes the merged subscription with the same cause.
//! - After that the reducer is never called again.
//! - Cancelling the merged subscription stops every fan-in task, which drops
//!   (and so cancels) the inputs.
//!
//! [`merge_subscribers`] applies the same merge to brokers: each subscription
//! taken from the result subscribes once to every source and merges them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::RunError;
use crate::psub::options::{generate_name, SubscriptionOptions};
use crate::psub::publish::Publish;
use crate::psub::subscriber::{Subscribe, Subscriber};
use crate::psub::subscription::Subscription;

type Reducer<T> = Arc<dyn Fn(&mut [Option<T>]) -> Option<T> + Send + Sync>;

/// Several brokers seen as one, see [`merge_subscribers`].
pub struct MergedSubscriber<T> {
    sources: Vec<Subscriber<T>>,
    reducer: Reducer<T>,
}

/// Combines `sources` so every subscription merges one subscription per
/// source through `reducer`.
pub fn merge_subscribers<T, F>(sources: Vec<Subscriber<T>>, reducer: F) -> MergedSubscriber<T>
where
    T: Send + 'static,
    F: Fn(&mut [Option<T>]) -> Option<T> + Send + Sync + 'static,
{
    MergedSubscriber {
        sources,
        reducer: Arc::new(reducer),
    }
}

impl<T: Send + 'static> Subscribe<T> for MergedSubscriber<T> {
    fn subscribe(&self, parent: &CancellationToken, opts: SubscriptionOptions) -> Subscription<T> {
        // inputs keep generated names; the caller's name goes to the merged one
        let input_opts = SubscriptionOptions {
            name: None,
            ..opts.clone()
        };
        let inputs = self
            .sources
            .iter()
            .map(|source| source.subscribe(parent, input_opts.clone()))
            .collect();
        let reducer = self.reducer.clone();
        merge(parent, inputs, move |latest: &mut [Option<T>]| reducer(latest), opts)
    }
}

/// Reducer forwarding whichever input produced a value, for
/// [`merge_subscribers`] over brokers of independent events.
///
/// Every emitted value is taken out, so each one is forwarded once.
pub fn take_any<T>(latest: &mut [Option<T>]) -> Option<T> {
    latest.iter_mut().find_map(Option::take)
}

/// Merges `inputs` through `reducer`.
///
/// Zero inputs yield a subscription that is already closed; a single input is
/// returned unchanged.
pub fn merge<T, F>(
    parent: &CancellationToken,
    mut inputs: Vec<Subscription<T>>,
    mut reducer: F,
    opts: SubscriptionOptions,
) -> Subscription<T>
where
    T: Send + 'static,
    F: FnMut(&mut [Option<T>]) -> Option<T> + Send + 'static,
{
    if inputs.is_empty() {
        return Subscription::with_error(parent, RunError::fail("merge: no input subscriptions"), opts);
    }
    if inputs.len() == 1 {
        if let Some(only) = inputs.pop() {
            return only;
        }
    }

    let opts = SubscriptionOptions::new()
        .with_name(generate_name("merged"))
        .merged(&opts);
    let (merged, publisher) = Subscription::new(parent, opts);
    let stop = merged.token();
    let n = inputs.len();
    let (tx, mut rx) = mpsc::channel::<(usize, Result<T, RunError>)>(n);

    for (index, mut input) in inputs.into_iter().enumerate() {
        let tx = tx.clone();
        let stop = stop.clone();
        let span = tracing::debug_span!("task", name = %format!("{}@merge-in", input.name()));
        tokio::spawn(
            async move {
                loop {
                    let item = tokio::select! {
                        biased;
                        _ = stop.cancelled() => return,
                        item = input.recv() => item,
                    };
                    let closed = item.is_err();
                    if tx.send((index, item)).await.is_err() || closed {
                        return;
                    }
                }
            }
            .instrument(span),
        );
    }
    drop(tx);

    let span = tracing::debug_span!("task", name = %format!("{}@merge", merged.name()));
    tokio::spawn(
        async move {
            let mut latest: Vec<Option<T>> = (0..n).map(|_| None).collect();
            let cause = loop {
                let (index, item) = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break RunError::Canceled,
                    msg = rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break RunError::Canceled,
                    },
                };
                match item {
                    Err(cause) => break cause,
                    Ok(value) => {
                        latest[index] = Some(value);
                        if let Some(out) = reducer(&mut latest) {
                            if let Err(e) = publisher.send_data(&stop, out).await {
                                break e;
                            }
                        }
                    }
                }
            };
            publisher.send_error(cause);
        }
        .instrument(span),
    );
    merged
}
