//! # feedvisor
//!
//! **Feedvisor** is the concurrency and lifecycle core of a chat-bot content
//! pipeline: a supervision tree, a typed publish/subscribe broker, and a
//! generic engine that turns feed plugins into persisted, periodically polled
//! subscriptions.
//!
//! Concrete feeds (RSS, Hacker News, ...), the storage backend and the bot
//! frontends are collaborators plugged in through [`Feeder`], [`Store`] and
//! [`Deliver`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                          RunContext "bot" (root)
//!        ┌──────────────────────────┼───────────────────────────┐
//!        ▼                          ▼                           ▼
//! ┌──────────────┐          ┌──────────────┐            ┌──────────────┐
//! │  FeedEngine  │          │  FeedEngine  │            │  Delivery    │
//! │  <RssFeeder> │          │  <HnFeeder>  │            │  Pipeline    │
//! │ poll loops   │          │ poll loops   │            │ (retry loop) │
//! └──────┬───────┘          └──────┬───────┘            └──────▲───────┘
//!        │ Vec<Content>            │ Vec<Content>              │
//!        ▼                         ▼                           │
//! ┌─────────────────────────────────────────────────────┐      │
//! │        Publisher<Vec<Content>> / Subscriber         │──────┘
//! │        (live set of Subscriptions, fan-out)         │
//! └─────────────────────────────────────────────────────┘
//!
//!   Command ──► CommandRouter ──► FeedEngine::handle_command ──► Store
//! ```
//!
//! ### Lifecycle
//! ```text
//! root.start(activity) ──► child context "root/<activity>" ──► Activity::start
//!    ├─ Err ──► child + root cancelled with the cause, checks marked failed
//!    └─ Ok  ──► watcher: child failure (non-cancel) cancels root
//!
//! ctx.cancel(cause)              (first cause wins)
//!    ├─► work group cancelled and drained    (go(..) tasks, poll loops)
//!    ├─► cleanup group cancelled and drained (on_cancel hooks)
//!    └─► done
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Supervision**   | Hierarchical contexts, activities, health aggregation.        | [`RunContext`], [`Activity`], [`CheckResult`]   |
//! | **Pub/Sub**       | Typed broker with blocking or dropping subscriptions.         | [`new_subscriber`], [`Subscription`], [`merge`] |
//! | **Feeds**         | Command-driven, persisted, periodically polled subscriptions. | [`FeedEngine`], [`Feeder`], [`SeenFilter`]      |
//! | **Delivery**      | Rate-limit aware push to a chat frontend.                     | [`DeliveryPipeline`], [`Deliver`], [`SendFn`]   |
//! | **Policies**      | Retry ceiling and fallback backoff.                           | [`RetryPolicy`], [`BackoffPolicy`]              |
//! | **Errors**        | Typed causes and failures.                                    | [`RunError`], [`FeedError`], [`SendError`]      |
//! | **Configuration** | Centralized runtime settings.                                 | [`Config`]                                      |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use feedvisor::{
//!     new_subscriber, Command, Config, Content, DeliveryPipeline, FeedEngine, FeedSubscription,
//!     Feeder, HandleCommand, MemoryStore, RunContext, RunError, SendError, SendFn, SubscriberOptions,
//!     SubscriptionOptions,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Feeder for Echo {
//!     fn name(&self) -> &str { "echo" }
//!     fn table_name(&self) -> &str { "echo:subscriptions:" }
//!     async fn fetch(&self, _: &CancellationToken, sub: &FeedSubscription) -> anyhow::Result<Vec<Content>> {
//!         Ok(vec![Content::new(sub.thread_id, format!("hello from {}", sub.name))])
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let (content, publisher) = new_subscriber::<Vec<Content>>(
//!         SubscriberOptions::new()
//!             .with_name("content")
//!             .with_subscription_options(SubscriptionOptions::new().with_blocking(true)),
//!     );
//!
//!     let root = RunContext::root("bot");
//!     let send = SendFn::new(|thread_id: i64, text: String| async move {
//!         println!("[{thread_id}] {text}");
//!         Ok::<(), SendError>(())
//!     });
//!     root.start(Arc::new(DeliveryPipeline::new(content, send, cfg.delivery.clone()))).await;
//!
//!     let engine = Arc::new(FeedEngine::new(Echo, Arc::new(MemoryStore::new()), Arc::new(publisher), cfg.feed.clone()));
//!     root.start(engine.clone()).await;
//!     root.set_ready();
//!
//!     engine.handle_command(Command::new("/echo", 1, "add world 90")).await?;
//!     tokio::time::sleep(Duration::from_millis(10)).await;
//!
//!     root.cancel(RunError::Canceled);
//!     root.wait().await?;
//!     Ok(())
//! }
//! ```
mod config;
mod delivery;
mod error;
mod feed;
mod metrics;
mod policies;
mod psub;
mod run;
mod store;

// ---- Public re-exports ----

pub use config::{Config, DedupConfig, DeliveryConfig, FeedConfig};
pub use delivery::{Deliver, DeliveryOutcome, DeliveryPipeline, SendError, SendFn};
pub use error::{HealthError, RunError};
pub use feed::{
    format_interval, parse_command, Action, Command, CommandRouter, Content, FeedEngine, FeedError,
    FeedSubscription, Feeder, HandleCommand, ParsedCommand, SeenFilter, ThreadId,
};
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use psub::{
    map, merge, merge_subscribers, mux, new_subscriber, process, take_any, wrap, MergedSubscriber, Publish,
    Publisher, Subscribe, Subscriber, SubscriberOptions, Subscription, SubscriptionOptions, SubscriptionPublisher,
    Throttle,
};
pub use run::{
    on_interval, periodically, retry, sleep, Activity, ActivityFn, CheckResult, HealthChecker, Probe, ProbeFuture, ReadyFlag,
    RunContext,
};
pub use store::{MemoryStore, Store, StoreError};
