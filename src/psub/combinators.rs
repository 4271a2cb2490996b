//! Consuming and transforming subscriptions.
//!
//! - [`process`] drains a subscription through a handler.
//! - [`wrap`] builds a derived subscription through an async, fallible,
//!   filtering mapper; [`map`] is the pure, synchronous special case.
//! - [`mux`] turns one subscription into a broker so several consumers can share it.
//!
//! A derived subscription closes when the source closes, with the source's
//! cause. Cancelling the derived subscription drops, and so cancels, the source.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::RunError;
use crate::psub::options::{SubscriberOptions, SubscriptionOptions};
use crate::psub::publish::Publish;
use crate::psub::subscriber::{new_subscriber, Subscriber};
use crate::psub::subscription::Subscription;

/// Feeds every value of `sub` to `f` until `token` is cancelled, the
/// subscription closes, or `f` fails. The subscription is cancelled on return.
pub async fn process<T, F, Fut>(
    token: &CancellationToken,
    mut sub: Subscription<T>,
    mut f: F,
) -> Result<(), RunError>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), RunError>>,
{
    loop {
        let data = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RunError::Canceled),
            res = sub.recv() => res?,
        };
        f(data).await?;
    }
}

/// Derives a subscription whose values are `f(value)` for every source value
/// where `f` returns `Ok(Some(_))`.
///
/// `Ok(None)` filters the value out; an error closes the derived subscription
/// with that error.
pub fn wrap<T, R, F, Fut>(source: Subscription<T>, opts: SubscriptionOptions, mut f: F) -> Subscription<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<R>, RunError>> + Send,
{
    let (wrapped, publisher) = Subscription::new(&CancellationToken::new(), opts);
    let token = wrapped.token();
    let span = tracing::debug_span!("task", name = %format!("{}@wrap", wrapped.name()));

    tokio::spawn(
        async move {
            let res = process(&token, source, |data| {
                let publisher = publisher.clone();
                let token = token.clone();
                let mapped = f(data);
                async move {
                    match mapped.await? {
                        Some(out) => publisher.send_data(&token, out).await,
                        None => Ok(()),
                    }
                }
            })
            .await;
            if let Err(e) = res {
                publisher.send_error(e);
            }
        }
        .instrument(span),
    );
    wrapped
}

/// Derives a subscription of `f(value)` for every source value.
pub fn map<T, R, F>(source: Subscription<T>, opts: SubscriptionOptions, mut f: F) -> Subscription<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnMut(T) -> R + Send + 'static,
{
    wrap(source, opts, move |data| {
        let out = f(data);
        async move { Ok(Some(out)) }
    })
}

/// Re-publishes one subscription through a new broker named after it.
///
/// When the source closes, every subscription of the returned broker closes
/// with the same cause.
pub fn mux<T>(source: Subscription<T>, opts: SubscriberOptions) -> Subscriber<T>
where
    T: Clone + Send + 'static,
{
    let opts = SubscriberOptions {
        name: opts.name.or_else(|| Some(source.name().to_owned())),
        ..opts
    };
    let (subscriber, publisher) = new_subscriber(opts);
    // runs until the source closes, so its cause reaches every subscription
    let token = CancellationToken::new();
    let span = tracing::debug_span!("task", name = %format!("{}@mux", source.name()));

    tokio::spawn(
        async move {
            let res = process(&token, source, |data| {
                let publisher = publisher.clone();
                let token = token.clone();
                async move { publisher.send_data(&token, data).await }
            })
            .await;
            if let Err(e) = res {
                publisher.send_error(e);
            }
        }
        .instrument(span),
    );
    subscriber
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(token: &CancellationToken) -> (Subscription<u32>, crate::psub::SubscriptionPublisher<u32>) {
        Subscription::new(
            token,
            SubscriptionOptions::new().with_buffer(16).with_blocking(true),
        )
    }

    #[tokio::test]
    async fn test_process_stops_on_handler_error() {
        let token = CancellationToken::new();
        let (sub, publisher) = source(&token);
        for i in 0..3 {
            publisher.send_data(&token, i).await.unwrap();
        }

        let mut seen = Vec::new();
        let res = process(&token, sub, |v| {
            seen.push(v);
            async move {
                if v == 1 {
                    Err(RunError::fail("bad item"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(res, Err(RunError::fail("bad item")));
        assert_eq!(seen, vec![0, 1]);
        assert!(publisher.is_done());
    }

    #[tokio::test]
    async fn test_map_transforms_in_order() {
        let token = CancellationToken::new();
        let (sub, publisher) = source(&token);
        let mut doubled = map(sub, SubscriptionOptions::new().with_buffer(16), |v| v * 2);

        for i in 1..=3 {
            publisher.send_data(&token, i).await.unwrap();
        }
        for i in 1..=3 {
            assert_eq!(doubled.recv().await.unwrap(), i * 2);
        }
    }

    #[tokio::test]
    async fn test_wrap_filters_and_fails() {
        let token = CancellationToken::new();
        let (sub, publisher) = source(&token);
        let mut odd = wrap(
            sub,
            SubscriptionOptions::new().with_buffer(16),
            |v: u32| async move {
                match v {
                    99 => Err(RunError::fail("poison")),
                    v if v % 2 == 1 => Ok(Some(v.to_string())),
                    _ => Ok(None),
                }
            },
        );

        for i in [1, 2, 3] {
            publisher.send_data(&token, i).await.unwrap();
        }
        assert_eq!(odd.recv().await.unwrap(), "1");
        assert_eq!(odd.recv().await.unwrap(), "3");

        publisher.send_data(&token, 99).await.unwrap();
        assert_eq!(odd.recv().await, Err(RunError::fail("poison")));
    }

    #[tokio::test]
    async fn test_wrapped_closes_with_source_cause() {
        let token = CancellationToken::new();
        let (sub, publisher) = source(&token);
        let mut mapped = map(sub, SubscriptionOptions::new(), |v| v + 1);

        publisher.send_error(RunError::fatal("feed gone"));
        assert_eq!(mapped.recv().await, Err(RunError::fatal("feed gone")));
    }

    #[tokio::test]
    async fn test_cancelling_wrapped_cancels_source() {
        let token = CancellationToken::new();
        let (sub, publisher) = source(&token);
        let mapped = map(sub, SubscriptionOptions::new(), |v| v + 1);

        mapped.cancel();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(publisher.is_done());
    }

    #[tokio::test]
    async fn test_mux_fans_out_source() {
        let token = CancellationToken::new();
        let (sub, publisher) = source(&token);
        let shared = mux(
            sub,
            SubscriberOptions::new().with_subscription_options(
                SubscriptionOptions::new().with_buffer(4).with_blocking(true),
            ),
        );
        let mut a = shared.subscribe(&token, SubscriptionOptions::new());
        let mut b = shared.subscribe(&token, SubscriptionOptions::new());

        publisher.send_data(&token, 5).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), 5);
        assert_eq!(b.recv().await.unwrap(), 5);

        publisher.send_error(RunError::fatal("upstream closed"));
        assert_eq!(a.recv().await, Err(RunError::fatal("upstream closed")));
        assert_eq!(b.recv().await, Err(RunError::fatal("upstream closed")));
    }
}
