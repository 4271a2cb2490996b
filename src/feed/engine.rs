//! # Feed engine.
//!
//! Turns a [`Feeder`] into a set of persisted, independently cancellable,
//! periodically polled subscriptions driven by text commands.
//!
//! ```text
//!   Command ──► Feeder::parse_command ──► add / list / remove
//!                                           │
//!          ┌────────────── Store ◄──────────┤   (source of truth at start)
//!          ▼                                ▼
//!   SubscriptionIndex: name ─► (record, poll token)
//!          │
//!          ▼  one task per subscription
//!   fetch now, then every interval ──► Vec<Content> ──► content publisher
//! ```
//!
//! ## Rules
//! - At most one poll loop per subscription name.
//! - A poll loop stops only on `remove` or when the engine's context stops.
//! - Fetch failures are logged and counted; the next tick tries again.
//! - Command errors are answered on the command's thread, never escalated.
//! - A store failure while loading at start is fatal; "not found" means
//!   no subscriptions yet.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::error::{HealthError, RunError};
use crate::feed::command::{format_interval, Action, Command, ParsedCommand};
use crate::feed::error::FeedError;
use crate::feed::feeder::Feeder;
use crate::feed::index::SubscriptionIndex;
use crate::feed::router::HandleCommand;
use crate::feed::subscription::{Content, FeedSubscription};
use crate::feed::ThreadId;
use crate::psub::Publish;
use crate::run::{Activity, ReadyFlag, RunContext};
use crate::store::Store;

struct Inner<F> {
    feeder: F,
    store: Arc<dyn Store>,
    content: Arc<dyn Publish<Vec<Content>>>,
    config: FeedConfig,
    index: SubscriptionIndex,
    ctx: OnceLock<RunContext>,
    loaded: ReadyFlag,
}

/// Generic subscription engine for one feeder.
///
/// Start it with [`RunContext::start`]; afterwards feed it commands through
/// [`HandleCommand::handle_command`], directly or via a
/// [`CommandRouter`](crate::CommandRouter).
pub struct FeedEngine<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for FeedEngine<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: Feeder> FeedEngine<F> {
    pub fn new(
        feeder: F,
        store: Arc<dyn Store>,
        content: Arc<dyn Publish<Vec<Content>>>,
        config: FeedConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                feeder,
                store,
                content,
                config,
                index: SubscriptionIndex::default(),
                ctx: OnceLock::new(),
                loaded: ReadyFlag::default(),
            }),
        }
    }

    pub fn feeder(&self) -> &F {
        &self.inner.feeder
    }

    /// Current subscriptions, ordered by lowercased name.
    pub fn subscriptions(&self) -> Vec<FeedSubscription> {
        self.inner
            .index
            .records()
            .into_iter()
            .map(|r| (*r).clone())
            .collect()
    }

    fn context(&self) -> Result<&RunContext, FeedError> {
        self.inner.ctx.get().ok_or_else(|| FeedError::NotStarted {
            feed: self.inner.feeder.name().to_owned(),
        })
    }

    async fn load(&self) -> Result<Vec<FeedSubscription>, FeedError> {
        let inner = &self.inner;
        let rows = match inner.store.list(inner.feeder.table_name()).await {
            Ok(rows) => rows,
            Err(e) if inner.store.is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        rows.iter()
            .map(|(id, bytes)| FeedSubscription::decode(id, bytes))
            .collect()
    }

    async fn dispatch(&self, ctx: &RunContext, cmd: ParsedCommand) -> Result<(), FeedError> {
        match cmd.action {
            Action::Add => self.add(ctx, cmd).await,
            Action::List => self.list(ctx, cmd.thread_id).await,
            Action::Remove => self.remove(ctx, cmd).await,
        }
    }

    async fn add(&self, ctx: &RunContext, cmd: ParsedCommand) -> Result<(), FeedError> {
        let inner = &self.inner;
        let feed = inner.feeder.name();

        if let Some(interval) = cmd.interval {
            let rejected = if interval < inner.config.min_interval {
                Some(FeedError::InvalidInterval {
                    min_minutes: inner.config.min_interval.as_secs() / 60,
                })
            } else if interval > inner.config.max_interval {
                Some(FeedError::IntervalTooLong {
                    max_minutes: inner.config.max_interval.as_secs() / 60,
                })
            } else {
                None
            };
            if let Some(err) = rejected {
                self.reply(ctx, cmd.thread_id, err.to_string()).await?;
                return Err(err);
            }
        }

        let exists = FeedError::AlreadyExists {
            feed: feed.to_owned(),
            name: cmd.name.clone(),
        };
        if inner.index.contains(&cmd.name) {
            return self.reply(ctx, cmd.thread_id, exists.to_string()).await;
        }

        let mut record = FeedSubscription {
            id: String::new(),
            name: cmd.name,
            interval: inner.config.effective_interval(cmd.interval),
            thread_id: cmd.thread_id,
            platform: cmd.platform,
            url: cmd.url,
        };
        record.id = inner
            .store
            .add(inner.feeder.table_name(), record.encode()?)
            .await?;

        let record = Arc::new(record);
        let Some(token) = inner.index.insert(record.clone(), &ctx.token()) else {
            // lost a race with a concurrent add of the same name
            inner.store.delete(inner.feeder.table_name(), &record.id).await?;
            return self.reply(ctx, record.thread_id, exists.to_string()).await;
        };

        info!(
            feed,
            name = %record.name,
            thread_id = record.thread_id,
            interval = %format_interval(record.interval),
            "subscription added"
        );
        self.spawn_poll(ctx, record, token);
        Ok(())
    }

    async fn list(&self, ctx: &RunContext, thread_id: ThreadId) -> Result<(), FeedError> {
        let records = self.inner.index.records();
        if records.is_empty() {
            return self.reply(ctx, thread_id, "No subscriptions").await;
        }

        let limit = self.inner.config.list_chunk_limit_clamped();
        let entries = records
            .iter()
            .map(|record| format!("{}: {}\n", record.name, format_interval(record.interval)));
        let chunks = pack_chunks(entries, limit)
            .into_iter()
            .map(|msg| Content::new(thread_id, msg))
            .collect();

        self.publish(ctx, chunks).await
    }

    async fn remove(&self, ctx: &RunContext, cmd: ParsedCommand) -> Result<(), FeedError> {
        let inner = &self.inner;
        let feed = inner.feeder.name();

        let Some(record) = inner.index.get(&cmd.name) else {
            let err = FeedError::NotFound {
                feed: feed.to_owned(),
                name: cmd.name,
            };
            return self.reply(ctx, cmd.thread_id, err.to_string()).await;
        };

        inner.store.delete(inner.feeder.table_name(), &record.id).await?;
        inner.index.remove(&cmd.name);
        info!(feed, name = %record.name, "subscription removed");

        self.reply(ctx, cmd.thread_id, format!("{feed}: removed {}", cmd.name))
            .await
    }

    async fn reply(&self, ctx: &RunContext, thread_id: ThreadId, text: impl Into<String>) -> Result<(), FeedError> {
        self.publish(ctx, vec![Content::new(thread_id, text)]).await
    }

    async fn publish(&self, ctx: &RunContext, batch: Vec<Content>) -> Result<(), FeedError> {
        self.inner
            .content
            .send_data(&ctx.token(), batch)
            .await
            .map_err(FeedError::Publish)
    }

    fn spawn_poll(&self, ctx: &RunContext, record: Arc<FeedSubscription>, token: CancellationToken) {
        let engine = self.clone();
        let poller = ctx.clone();
        ctx.go(&format!("poll:{}", record.key()), move |_| async move {
            engine.poll(&poller, &record, &token).await;
            Ok::<(), RunError>(())
        });
    }

    async fn poll(&self, ctx: &RunContext, record: &FeedSubscription, token: &CancellationToken) {
        let feed = self.inner.feeder.name();
        debug!(feed, name = %record.name, "polling started");

        self.fetch_once(ctx, record, token).await;

        let period = self.inner.config.poll_period(record.interval);
        let Some(first) = Instant::now().checked_add(period) else {
            warn!(feed, name = %record.name, interval = ?period, "interval out of range, polling paused");
            token.cancelled().await;
            return;
        };
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.fetch_once(ctx, record, token).await,
            }
        }
        debug!(feed, name = %record.name, "polling stopped");
    }

    async fn fetch_once(&self, ctx: &RunContext, record: &FeedSubscription, token: &CancellationToken) {
        let inner = &self.inner;
        let feed = inner.feeder.name();
        let metrics = ctx.metrics();

        let res = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            res = inner.feeder.fetch(token, record) => res,
        };
        let items = match res {
            Ok(items) => items,
            Err(e) => {
                metrics.record_fetch(false);
                error!(feed, name = %record.name, error = %e, "fetch failed");
                return;
            }
        };
        metrics.record_fetch(true);
        debug!(feed, name = %record.name, new = items.len(), "fetch finished");
        if items.is_empty() {
            return;
        }

        match inner.content.send_data(token, items).await {
            Ok(()) => metrics.record_batch(),
            Err(e) if e.is_canceled() => {}
            Err(e) => warn!(feed, name = %record.name, error = %e, "publish failed"),
        }
    }
}

/// Packs `entries` into messages of at most `limit` characters each.
///
/// Entries are kept whole when they fit; a longer entry is split across
/// messages of its own.
fn pack_chunks(entries: impl IntoIterator<Item = String>, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut msg = String::new();
    let mut msg_chars = 0;

    for entry in entries {
        let entry_chars = entry.chars().count();
        if msg_chars > 0 && msg_chars + entry_chars > limit {
            chunks.push(std::mem::take(&mut msg));
            msg_chars = 0;
        }
        if entry_chars <= limit {
            msg.push_str(&entry);
            msg_chars += entry_chars;
            continue;
        }

        let mut chars = entry.chars().peekable();
        while chars.peek().is_some() {
            let piece: String = chars.by_ref().take(limit).collect();
            msg_chars = piece.chars().count();
            msg = piece;
            if msg_chars == limit {
                chunks.push(std::mem::take(&mut msg));
                msg_chars = 0;
            }
        }
    }
    if !msg.is_empty() {
        chunks.push(msg);
    }
    chunks
}

#[async_trait]
impl<F: Feeder> Activity for FeedEngine<F> {
    fn name(&self) -> &str {
        self.inner.feeder.name()
    }

    async fn start(&self, ctx: &RunContext) -> Result<(), RunError> {
        let inner = &self.inner;
        if inner.ctx.set(ctx.clone()).is_err() {
            return Err(RunError::fatal(format!(
                "feed {} already started",
                inner.feeder.name()
            )));
        }

        let records = self.load().await.map_err(RunError::fatal)?;
        let count = records.len();
        for mut record in records {
            record.interval = inner.config.effective_interval(Some(record.interval));
            let record = Arc::new(record);
            match inner.index.insert(record.clone(), &ctx.token()) {
                Some(token) => self.spawn_poll(ctx, record, token),
                None => warn!(
                    feed = inner.feeder.name(),
                    name = %record.name,
                    id = %record.id,
                    "duplicate stored subscription ignored"
                ),
            }
        }

        inner.loaded.set();
        info!(feed = inner.feeder.name(), subscriptions = count, "feed started");
        Ok(())
    }

    async fn ready(&self) -> Result<(), HealthError> {
        if self.inner.loaded.is_set() {
            Ok(())
        } else {
            Err(HealthError::NotReady)
        }
    }
}

#[async_trait]
impl<F: Feeder> HandleCommand for FeedEngine<F> {
    async fn handle_command(&self, cmd: Command) -> Result<(), FeedError> {
        let ctx = self.context()?;
        let parsed = match self.inner.feeder.parse_command(&cmd) {
            Ok(parsed) => parsed,
            Err(e) => {
                if e.is_user_error() {
                    self.reply(ctx, cmd.thread_id, e.to_string()).await?;
                }
                return Err(e);
            }
        };
        debug!(feed = self.inner.feeder.name(), action = %parsed.action, name = %parsed.name, "command");
        self.dispatch(ctx, parsed).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::anyhow;
    use chrono::Utc;
    use parking_lot::Mutex;

    use super::*;
    use crate::config::DedupConfig;
    use crate::feed::dedup::SeenFilter;
    use crate::psub::{new_subscriber, Subscriber, SubscriberOptions, SubscriptionOptions};
    use crate::store::MemoryStore;

    const TABLE: &str = "foo:subscriptions:";

    /// Serves a scripted set of items per fetch, deduplicated through a SeenFilter.
    struct FakeFeeder {
        seen: SeenFilter,
        fetches: AtomicUsize,
        items: Mutex<Vec<(String, Option<chrono::DateTime<Utc>>)>>,
        fail: Mutex<bool>,
    }

    impl FakeFeeder {
        fn new(store: Arc<dyn Store>) -> Self {
            Self {
                seen: SeenFilter::new(store, "foo", DedupConfig::default()),
                fetches: AtomicUsize::new(0),
                items: Mutex::new(Vec::new()),
                fail: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl Feeder for FakeFeeder {
        fn name(&self) -> &str {
            "foo"
        }

        fn table_name(&self) -> &str {
            TABLE
        }

        async fn fetch(&self, _token: &CancellationToken, sub: &FeedSubscription) -> anyhow::Result<Vec<Content>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock() {
                return Err(anyhow!("upstream timeout"));
            }
            let items = self.items.lock().clone();
            let mut out = Vec::new();
            for (id, published) in items {
                if self.seen.check_and_mark(&sub.key(), &id, published, &id).await? {
                    out.push(Content::new(sub.thread_id, id));
                }
            }
            Ok(out)
        }
    }

    struct Harness {
        root: RunContext,
        store: Arc<MemoryStore>,
        engine: Arc<FeedEngine<FakeFeeder>>,
        content: Subscriber<Vec<Content>>,
    }

    fn harness_with(store: Arc<MemoryStore>) -> Harness {
        let (content, publisher) = new_subscriber::<Vec<Content>>(
            SubscriberOptions::default()
                .with_subscription_options(SubscriptionOptions::default().with_buffer(16).with_blocking(true)),
        );
        let feeder = FakeFeeder::new(store.clone());
        let engine = Arc::new(FeedEngine::new(
            feeder,
            store.clone(),
            Arc::new(publisher),
            FeedConfig::default(),
        ));
        let root = RunContext::root("test");
        Harness {
            root,
            store,
            engine,
            content,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryStore::new()))
    }

    async fn cmd(engine: &FeedEngine<FakeFeeder>, text: &str) -> Result<(), FeedError> {
        engine.handle_command(Command::new("/foo", 7, text)).await
    }

    fn texts(batch: &[Content]) -> Vec<&str> {
        batch.iter().map(|c| c.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_commands_before_start_are_rejected() {
        let h = harness();
        let err = cmd(&h.engine, "list").await.unwrap_err();
        assert_eq!(err.as_label(), "feed_not_started");
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_with_short_interval_is_rejected_and_not_persisted() {
        let h = harness();
        let mut replies = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;

        let err = cmd(&h.engine, "add golang 30").await.unwrap_err();
        assert_eq!(err, FeedError::InvalidInterval { min_minutes: 60 });
        assert_eq!(
            texts(&replies.recv().await.unwrap()),
            ["interval must be at least 60 minutes"]
        );
        assert_eq!(h.store.table_len(TABLE), 0);
        assert!(h.engine.subscriptions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_interval_is_answered_and_tree_survives() {
        let h = harness();
        let mut replies = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;

        let err = cmd(&h.engine, "add golang 18446744073709551615").await.unwrap_err();
        assert_eq!(err.as_label(), "feed_invalid_command");
        assert_eq!(texts(&replies.recv().await.unwrap()), ["foo: invalid interval"]);

        let err = cmd(&h.engine, "add golang 10000000").await.unwrap_err();
        assert_eq!(err, FeedError::IntervalTooLong { max_minutes: 525_600 });
        assert_eq!(
            texts(&replies.recv().await.unwrap()),
            ["interval must be at most 525600 minutes"]
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.store.table_len(TABLE), 0);
        assert!(h.root.cause().is_none());
        assert!(!h.root.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_huge_interval_is_capped() {
        let store = Arc::new(MemoryStore::new());
        let stored = FeedSubscription {
            id: String::new(),
            name: "golang".into(),
            interval: Duration::from_nanos(u64::MAX),
            thread_id: 3,
            platform: None,
            url: None,
        };
        store.add(TABLE, stored.encode().unwrap()).await.unwrap();

        let h = harness_with(store);
        h.root.start(h.engine.clone()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), 2);
        assert!(h.root.cause().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_without_interval_defaults_to_a_day() {
        let h = harness();
        h.root.start(h.engine.clone()).await;

        cmd(&h.engine, "add golang").await.unwrap();
        assert_eq!(h.store.table_len(TABLE), 1);
        let subs = h.engine.subscriptions();
        assert_eq!(subs[0].interval, Duration::from_secs(24 * 3600));
        assert_eq!(subs[0].thread_id, 7);
        assert!(!subs[0].id.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_add_is_rejected() {
        let h = harness();
        let mut replies = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;

        cmd(&h.engine, "add golang 90").await.unwrap();
        cmd(&h.engine, "add GoLang 120").await.unwrap();
        assert_eq!(
            texts(&replies.recv().await.unwrap()),
            ["foo: subscription GoLang already exists"]
        );
        assert_eq!(h.store.table_len(TABLE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_unknown_replies_without_store_mutation() {
        let h = harness();
        let mut replies = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;
        cmd(&h.engine, "add rust").await.unwrap();

        cmd(&h.engine, "remove golang").await.unwrap();
        assert_eq!(
            texts(&replies.recv().await.unwrap()),
            ["foo: subscription golang not found"]
        );
        assert_eq!(h.store.table_len(TABLE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_stops_polling_and_deletes() {
        let h = harness();
        let mut replies = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;

        cmd(&h.engine, "add golang 60").await.unwrap();
        cmd(&h.engine, "add rust 60").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = h.engine.feeder().fetches.load(Ordering::SeqCst);
        assert_eq!(before, 2);

        cmd(&h.engine, "remove GOLANG").await.unwrap();
        assert_eq!(texts(&replies.recv().await.unwrap()), ["foo: removed GOLANG"]);
        assert_eq!(h.store.table_len(TABLE), 1);

        tokio::time::sleep(Duration::from_secs(3601)).await;
        // only rust ticked
        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_is_sorted_chunked_and_repeatable() {
        let h = harness();
        let mut replies = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;

        cmd(&h.engine, "list").await.unwrap();
        assert_eq!(texts(&replies.recv().await.unwrap()), ["No subscriptions"]);

        for i in 0..80 {
            cmd(&h.engine, &format!("add feed-{i:02} 90")).await.unwrap();
        }
        cmd(&h.engine, "list").await.unwrap();
        let first = replies.recv().await.unwrap();
        cmd(&h.engine, "list").await.unwrap();
        let second = replies.recv().await.unwrap();

        assert_eq!(first, second);
        assert!(first.len() > 1);
        assert!(first.iter().all(|c| c.text.len() <= 1000 && c.thread_id == 7));
        assert!(first[0].text.starts_with("feed-00: 1h30m0s\nfeed-01: 1h30m0s\n"));
        let lines: usize = first.iter().map(|c| c.text.lines().count()).sum();
        assert_eq!(lines, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_splits_entries_longer_than_the_limit() {
        let h = harness();
        let mut replies = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;

        let long = "x".repeat(1500);
        cmd(&h.engine, &format!("add {long} 90")).await.unwrap();
        cmd(&h.engine, "add golang 90").await.unwrap();
        cmd(&h.engine, "list").await.unwrap();

        let chunks = replies.recv().await.unwrap();
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 1000));
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, format!("golang: 1h30m0s\n{long}: 1h30m0s\n"));
    }

    #[test]
    fn test_pack_chunks_counts_characters() {
        let entries = ["ééé\n".to_string(), "ab\n".to_string()];
        assert_eq!(pack_chunks(entries.clone(), 4), ["ééé\n", "ab\n"]);
        assert_eq!(pack_chunks(entries, 7), ["ééé\nab\n"]);

        let split = pack_chunks(["abcdefg".to_string(), "h".to_string()], 3);
        assert_eq!(split, ["abc", "def", "gh"]);
        assert!(pack_chunks(Vec::<String>::new(), 3).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_error_is_answered() {
        let h = harness();
        let mut replies = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;

        assert!(cmd(&h.engine, "add golang soon").await.is_err());
        assert_eq!(texts(&replies.recv().await.unwrap()), ["foo: invalid interval"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_poll_and_dedup() {
        let h = harness();
        let mut content = h.content.subscribe(&h.root.token(), SubscriptionOptions::default());
        h.root.start(h.engine.clone()).await;
        *h.engine.feeder().items.lock() = vec![
            ("fresh".into(), Some(Utc::now())),
            ("old".into(), Some(Utc::now() - chrono::Duration::hours(48))),
            ("undated".into(), None),
        ];

        cmd(&h.engine, "add foo 90").await.unwrap();
        assert_eq!(texts(&content.recv().await.unwrap()), ["fresh"]);
        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), 1);

        h.engine
            .feeder()
            .items
            .lock()
            .push(("later".into(), Some(Utc::now())));
        tokio::time::sleep(Duration::from_secs(89 * 60)).await;
        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), 2);
        assert_eq!(texts(&content.recv().await.unwrap()), ["later"]);

        let snap = h.root.metrics().snapshot();
        assert_eq!(snap.fetches, 2);
        assert_eq!(snap.batches_published, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_errors_do_not_stop_polling() {
        let h = harness();
        h.root.start(h.engine.clone()).await;
        *h.engine.feeder().fail.lock() = true;

        cmd(&h.engine, "add flaky 60").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2 * 3600 + 1)).await;

        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), 3);
        assert_eq!(h.root.metrics().snapshot().fetch_errors, 3);
        assert!(h.root.cause().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_resumes_persisted_subscriptions() {
        let store = Arc::new(MemoryStore::new());
        let stored = FeedSubscription {
            id: String::new(),
            name: "golang".into(),
            interval: Duration::ZERO,
            thread_id: 3,
            platform: None,
            url: None,
        };
        store.add(TABLE, stored.encode().unwrap()).await.unwrap();

        let h = harness_with(store);
        h.root.start(h.engine.clone()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let subs = h.engine.subscriptions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "golang");
        assert!(h.engine.ready().await.is_ok());
        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_outage_at_start_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let h = harness_with(store);

        h.root.start(h.engine.clone()).await;
        let err = h.root.wait().await.unwrap_err();
        assert!(err.is_fatal());

        let readiness: HashMap<_, _> = h
            .root
            .readiness()
            .await
            .into_iter()
            .map(|r| (r.name.clone(), r.ok))
            .collect();
        assert_eq!(readiness.get("test/foo"), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_stop_cancels_every_poll_loop() {
        let h = harness();
        h.root.start(h.engine.clone()).await;
        cmd(&h.engine, "add a 60").await.unwrap();
        cmd(&h.engine, "add b 60").await.unwrap();
        tokio::task::yield_now().await;

        h.root.cancel(RunError::Canceled);
        assert!(h.root.wait().await.is_ok());
        let fetched = h.engine.feeder().fetches.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(h.engine.feeder().fetches.load(Ordering::SeqCst), fetched);
    }
}
