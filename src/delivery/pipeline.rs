//! # Delivery pipeline.
//!
//! Drains the content broker and hands every item to a [`Deliver`]
//! implementation, one item at a time, in publish order.
//!
//! ```text
//! Subscribe<Vec<Content>> ──► subscribe ──► process(batch)
//!                                              │ for each item
//!                                              ▼
//!                         send ── ok ─────────────────► Delivered
//!                           │
//!                           ├─ rate limited, attempts left ─► wait retry_after
//!                           │                                 (or backoff), resend
//!                           ├─ rate limited, no attempts ───► GaveUp
//!                           └─ other error ─────────────────► Failed
//! ```
//!
//! ## Rules
//! - A failed item never blocks the rest of its batch or later batches.
//! - Only a broker error or cancellation stops the pipeline.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::DeliveryConfig;
use crate::delivery::deliver::Deliver;
use crate::delivery::error::SendError;
use crate::error::RunError;
use crate::feed::Content;
use crate::metrics::RunMetrics;
use crate::psub::{process, Subscribe, SubscriptionOptions};
use crate::run::{sleep, Activity, RunContext};

/// Result of delivering one item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent after `attempts` tries.
    Delivered { attempts: u32 },
    /// Still rate limited after `attempts` tries.
    GaveUp { attempts: u32 },
    /// Non-retryable send error.
    Failed { error: SendError },
    /// Stopped while sending or waiting.
    Canceled,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

struct Inner<D> {
    name: Cow<'static, str>,
    source: Box<dyn Subscribe<Vec<Content>>>,
    deliver: D,
    config: DeliveryConfig,
    metrics: OnceLock<Arc<RunMetrics>>,
}

/// Activity consuming content batches and pushing them to a frontend.
pub struct DeliveryPipeline<D> {
    inner: Arc<Inner<D>>,
}

impl<D> Clone for DeliveryPipeline<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Deliver> DeliveryPipeline<D> {
    /// Consumes `source`: one broker, or several joined with
    /// [`merge_subscribers`](crate::merge_subscribers).
    pub fn new<S>(source: S, deliver: D, config: DeliveryConfig) -> Self
    where
        S: Subscribe<Vec<Content>> + 'static,
    {
        Self::with_name("delivery", source, deliver, config)
    }

    /// Like [`DeliveryPipeline::new`] with a custom activity name, for
    /// running one pipeline per frontend.
    pub fn with_name<S>(name: impl Into<Cow<'static, str>>, source: S, deliver: D, config: DeliveryConfig) -> Self
    where
        S: Subscribe<Vec<Content>> + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                source: Box::new(source),
                deliver,
                config,
                metrics: OnceLock::new(),
            }),
        }
    }

    pub fn deliverer(&self) -> &D {
        &self.inner.deliver
    }

    fn metrics(&self) -> Option<&RunMetrics> {
        self.inner.metrics.get().map(Arc::as_ref)
    }

    /// Sends every item of `batch` in order. Stops early only on cancellation.
    pub async fn deliver_batch(&self, token: &CancellationToken, batch: Vec<Content>) -> Result<(), RunError> {
        for content in &batch {
            if self.deliver(token, content).await == DeliveryOutcome::Canceled {
                return Err(RunError::Canceled);
            }
        }
        Ok(())
    }

    /// Sends one item, retrying rate-limited attempts per the retry policy.
    pub async fn deliver(&self, token: &CancellationToken, content: &Content) -> DeliveryOutcome {
        let retry = &self.inner.config.retry;
        let thread_id = content.thread_id;
        let mut attempt = 1;

        loop {
            let res = tokio::select! {
                biased;
                _ = token.cancelled() => return DeliveryOutcome::Canceled,
                res = self.inner.deliver.send(thread_id, &content.text) => res,
            };

            let err = match res {
                Ok(()) => {
                    if let Some(m) = self.metrics() {
                        m.record_delivered();
                    }
                    debug!(thread_id, attempt, "delivered");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) => e,
            };

            if err.is_rate_limited() && retry.should_retry(attempt) {
                let wait = retry.delay(attempt, err.retry_after());
                warn!(thread_id, attempt, wait = ?wait, error = %err, "send failed, retrying");
                if let Some(m) = self.metrics() {
                    m.record_retry();
                }
                if sleep(token, wait).await.is_err() {
                    return DeliveryOutcome::Canceled;
                }
                attempt += 1;
                continue;
            }

            if let Some(m) = self.metrics() {
                m.record_delivery_failure();
            }
            error!(thread_id, attempt, error = %err, "failed to deliver content");
            return if err.is_rate_limited() {
                DeliveryOutcome::GaveUp { attempts: attempt }
            } else {
                DeliveryOutcome::Failed { error: err }
            };
        }
    }
}

#[async_trait]
impl<D: Deliver> Activity for DeliveryPipeline<D> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn start(&self, ctx: &RunContext) -> Result<(), RunError> {
        // A restarted pipeline keeps the first tree's metrics.
        let _ = self.inner.metrics.set(ctx.metrics().clone());

        // blocking, so batches wait while a rate limit is being waited out
        let sub = self.inner.source.subscribe(
            &ctx.token(),
            SubscriptionOptions::default()
                .with_name(format!("{}:content", ctx.name()))
                .with_blocking(true)
                .with_buffer(self.inner.config.content_buffer_clamped()),
        );
        let pipeline = self.clone();
        ctx.go("handle-content", move |token| async move {
            process(&token, sub, |batch| {
                let pipeline = pipeline.clone();
                let token = token.clone();
                async move { pipeline.deliver_batch(&token, batch).await }
            })
            .await
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;
    use crate::policies::{BackoffPolicy, RetryPolicy};
    use crate::psub::{new_subscriber, Publish, Publisher, SubscriberOptions};

    /// Plays back scripted results, then succeeds.
    struct Scripted {
        script: Mutex<VecDeque<Result<(), SendError>>>,
        calls: Mutex<Vec<(Instant, String)>>,
    }

    impl Scripted {
        fn with(results: Vec<Result<(), SendError>>) -> Self {
            Self {
                script: Mutex::new(results.into()),
                calls: Mutex::default(),
            }
        }

        fn texts(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Deliver for Scripted {
        async fn send(&self, _thread_id: i64, text: &str) -> Result<(), SendError> {
            self.calls.lock().push((Instant::now(), text.to_owned()));
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    fn pipeline(results: Vec<Result<(), SendError>>) -> (DeliveryPipeline<Scripted>, Publisher<Vec<Content>>) {
        let (sub, publisher) = new_subscriber(
            SubscriberOptions::default()
                .with_subscription_options(SubscriptionOptions::default().with_buffer(8).with_blocking(true)),
        );
        (
            DeliveryPipeline::new(sub, Scripted::with(results), DeliveryConfig::default()),
            publisher,
        )
    }

    fn item(text: &str) -> Content {
        Content::new(1, text)
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_advertised_retry_after() {
        let (p, _) = pipeline(vec![Err(SendError::rate_limited(Some(Duration::from_secs(5))))]);
        let token = CancellationToken::new();

        let outcome = p.deliver(&token, &item("a")).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });

        let calls = p.deliverer().calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0 - calls[0].0 >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_backoff_without_hint() {
        let (p, _) = pipeline(vec![Err(SendError::rate_limited(None)), Err(SendError::rate_limited(None))]);
        let token = CancellationToken::new();

        assert!(p.deliver(&token, &item("a")).await.is_delivered());
        let calls = p.deliverer().calls.lock().clone();
        let (first, second) = (calls[1].0 - calls[0].0, calls[2].0 - calls[1].0);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(200));
        assert!(second >= Duration::from_millis(200) && second < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_four_rate_limits() {
        let limited = || Err(SendError::rate_limited(Some(Duration::from_secs(1))));
        let (p, _) = pipeline(vec![limited(), limited(), limited(), limited()]);
        let token = CancellationToken::new();

        assert_eq!(
            p.deliver(&token, &item("a")).await,
            DeliveryOutcome::GaveUp { attempts: 4 }
        );
        assert_eq!(p.deliverer().calls.lock().len(), 4);
        assert!(p.deliver(&token, &item("b")).await.is_delivered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_failure_is_not_retried() {
        let (p, _) = pipeline(vec![Err(SendError::failed("chat not found"))]);
        let token = CancellationToken::new();

        assert!(matches!(
            p.deliver(&token, &item("a")).await,
            DeliveryOutcome::Failed { .. }
        ));
        assert_eq!(p.deliverer().calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let (p, _) = pipeline(vec![Err(SendError::rate_limited(Some(Duration::from_secs(60))))]);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        assert_eq!(p.deliver(&token, &item("a")).await, DeliveryOutcome::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_survives_failures_and_keeps_order() {
        let limited = || Err(SendError::rate_limited(Some(Duration::from_secs(5))));
        let (p, publisher) = pipeline(vec![
            limited(),
            limited(),
            limited(),
            limited(),
            Err(SendError::failed("boom")),
        ]);
        let root = RunContext::root("test");
        root.start(Arc::new(p.clone())).await;

        let token = root.token();
        publisher
            .send_data(&token, vec![item("a"), item("b")])
            .await
            .unwrap();
        publisher.send_data(&token, vec![item("c")]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(p.deliverer().texts(), ["a", "a", "a", "a", "b", "c"]);
        assert!(root.cause().is_none());

        let snap = root.metrics().snapshot();
        assert_eq!(snap.items_delivered, 1);
        assert_eq!(snap.delivery_retries, 3);
        assert_eq!(snap.delivery_failures, 2);

        root.cancel(RunError::Canceled);
        assert!(root.wait().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_wait_during_rate_limit_on_a_default_broker() {
        let (sub, publisher) = new_subscriber::<Vec<Content>>(SubscriberOptions::default());
        let limited = Err(SendError::rate_limited(Some(Duration::from_secs(5))));
        let p = DeliveryPipeline::new(sub, Scripted::with(vec![limited]), DeliveryConfig::default());
        let root = RunContext::root("test");
        root.start(Arc::new(p.clone())).await;

        let token = root.token();
        for text in ["a", "b", "c", "d"] {
            publisher.send_data(&token, vec![item(text)]).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(p.deliverer().texts(), ["a", "a", "b", "c", "d"]);
        root.cancel(RunError::Canceled);
        assert!(root.wait().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_drains_merged_brokers() {
        let (rss, rss_pub) = new_subscriber::<Vec<Content>>(SubscriberOptions::default());
        let (hn, hn_pub) = new_subscriber::<Vec<Content>>(SubscriberOptions::default());
        let p = DeliveryPipeline::new(
            crate::psub::merge_subscribers(vec![rss, hn], crate::psub::take_any),
            Scripted::with(Vec::new()),
            DeliveryConfig::default(),
        );
        let root = RunContext::root("test");
        root.start(Arc::new(p.clone())).await;

        let token = root.token();
        rss_pub.send_data(&token, vec![item("go 1.24")]).await.unwrap();
        hn_pub.send_data(&token, vec![item("show hn")]).await.unwrap();
        rss_pub.send_data(&token, vec![item("go 1.25")]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut texts = p.deliverer().texts();
        texts.sort();
        assert_eq!(texts, ["go 1.24", "go 1.25", "show hn"]);
        root.cancel(RunError::Canceled);
        assert!(root.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_broker_error_stops_pipeline() {
        let (p, publisher) = pipeline(Vec::new());
        let root = RunContext::root("test");
        root.start(Arc::new(p)).await;

        publisher.send_error(RunError::fatal("content source gone"));
        let err = root.wait().await.unwrap_err();
        assert_eq!(err, RunError::fatal("content source gone"));
    }

    #[test]
    fn test_custom_retry_policy() {
        let cfg = DeliveryConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                backoff: BackoffPolicy::constant(Duration::from_secs(1)),
            },
            ..DeliveryConfig::default()
        };
        assert!(cfg.retry.should_retry(1));
        assert!(!cfg.retry.should_retry(2));
    }
}
