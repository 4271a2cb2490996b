//! # Example: Chat Bot Wiring
//!
//! Two feed engines publish into their own brokers; one delivery pipeline
//! drains both through `merge_subscribers` and prints every message. The
//! "frontend" rate-limits its first send to show the retry path.
//!
//! ```text
//! /clock, /quotes ──► CommandRouter ──► FeedEngine<Clock>  ──► broker ─┐
//!                                   └─► FeedEngine<Quotes> ──► broker ─┴─► DeliveryPipeline ──► stdout
//! ```
//!
//! Run with `cargo run --example bot`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use feedvisor::{
    merge_subscribers, new_subscriber, take_any, Command, CommandRouter, Config, Content, Deliver, DeliveryPipeline,
    FeedEngine, FeedSubscription, Feeder, HandleCommand, MemoryStore, RunContext, RunError, SeenFilter, SendError,
    Store, SubscriberOptions, SubscriptionOptions, ThreadId,
};

/// Posts the current time on every poll; the first poll runs right after `add`.
struct Clock;

#[async_trait]
impl Feeder for Clock {
    fn name(&self) -> &str {
        "clock"
    }

    fn table_name(&self) -> &str {
        "clock:subscriptions:"
    }

    async fn fetch(&self, _: &CancellationToken, sub: &FeedSubscription) -> anyhow::Result<Vec<Content>> {
        let text = format!("[{}] it is {}", sub.name, Utc::now().format("%H:%M:%S"));
        Ok(vec![Content::new(sub.thread_id, text)])
    }
}

/// Posts a fixed set of quotes, each only once per subscription.
struct Quotes {
    seen: SeenFilter,
}

#[async_trait]
impl Feeder for Quotes {
    fn name(&self) -> &str {
        "quotes"
    }

    fn table_name(&self) -> &str {
        "quotes:subscriptions:"
    }

    async fn fetch(&self, _: &CancellationToken, sub: &FeedSubscription) -> anyhow::Result<Vec<Content>> {
        let mut out = Vec::new();
        for quote in ["Simplicity is prerequisite for reliability.", "Make it work, make it right."] {
            if self.seen.check_and_mark(&sub.key(), quote, Some(Utc::now()), &quote).await? {
                out.push(Content::new(sub.thread_id, quote));
            }
        }
        Ok(out)
    }
}

/// Prints messages; the first send is rate limited.
#[derive(Default)]
struct Stdout {
    limited_once: AtomicBool,
}

#[async_trait]
impl Deliver for Stdout {
    async fn send(&self, thread_id: ThreadId, text: &str) -> Result<(), SendError> {
        if !self.limited_once.swap(true, Ordering::SeqCst) {
            println!("[stdout] 429, retry after 200ms");
            return Err(SendError::rate_limited(Some(Duration::from_millis(200))));
        }
        println!("[thread {thread_id}] {text}");
        Ok(())
    }
}

fn broker(name: &str) -> (feedvisor::Subscriber<Vec<Content>>, feedvisor::Publisher<Vec<Content>>) {
    new_subscriber(
        SubscriberOptions::new()
            .with_name(name)
            .with_subscription_options(SubscriptionOptions::new().with_blocking(true)),
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::default();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let (clock_sub, clock_pub) = broker("clock-content");
    let (quotes_sub, quotes_pub) = broker("quotes-content");

    let clock = Arc::new(FeedEngine::new(Clock, store.clone(), Arc::new(clock_pub), cfg.feed.clone()));
    let quotes = Arc::new(FeedEngine::new(
        Quotes {
            seen: SeenFilter::new(store.clone(), "quotes", cfg.dedup.clone()),
        },
        store,
        Arc::new(quotes_pub),
        cfg.feed.clone(),
    ));
    let pipeline = DeliveryPipeline::new(
        merge_subscribers(vec![clock_sub, quotes_sub], take_any),
        Stdout::default(),
        cfg.delivery.clone(),
    );

    let root = RunContext::root("bot");
    root.start(Arc::new(pipeline)).await;
    root.start(clock.clone()).await;
    root.start(quotes.clone()).await;
    root.set_ready();

    let router = CommandRouter::new()
        .with_route("clock", clock.clone())
        .with_route("quotes", quotes.clone());

    for (name, text) in [
        ("/clock", "add tick 60"),
        ("/quotes", "add classics"),
        ("/clock", "list"),
        ("/quotes", "remove nothing"),
        ("/weather", "add berlin"),
    ] {
        println!("> {name} {text}");
        if let Err(e) = router.handle_command(Command::new(name, 1, text)).await {
            println!("[router] {e}");
        }
    }

    tokio::time::sleep(Duration::from_secs(1)).await;

    for check in root.readiness().await {
        println!("[ready] {} ok={}", check.name, check.ok);
    }
    println!("[metrics] {}", serde_json::to_string(&root.metrics().snapshot())?);

    root.cancel(RunError::Canceled);
    root.wait().await?;
    Ok(())
}
