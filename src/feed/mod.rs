//! # Feeds: persisted, periodically polled subscriptions.
//!
//! A [`FeedEngine`] drives one [`Feeder`] plugin. It owns the subscription
//! index, persists records through the [`Store`](crate::Store), runs one poll
//! loop per subscription and publishes fetched [`Content`] batches.
//!
//! ```text
//! Command ──► CommandRouter ──► FeedEngine<RssFeeder> ──► Publisher<Vec<Content>>
//!                          └──► FeedEngine<HnFeeder>  ──┘
//! ```
//!
//! Feeders deduplicate with a [`SeenFilter`].

mod command;
mod dedup;
mod engine;
mod error;
mod feeder;
mod index;
mod router;
mod subscription;

/// Destination routing key of a chat thread.
pub type ThreadId = i64;

pub use command::{format_interval, parse_command, Action, Command, ParsedCommand};
pub use dedup::SeenFilter;
pub use engine::FeedEngine;
pub use error::FeedError;
pub use feeder::Feeder;
pub use router::{CommandRouter, HandleCommand};
pub use subscription::{Content, FeedSubscription};
