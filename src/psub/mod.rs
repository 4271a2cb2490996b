//! # Typed publish/subscribe broker.
//!
//! Moves values between independently scheduled tasks without shared mutable
//! state. Every subscription is an ordered channel plus a sticky cause.
//!
//! ```text
//!                     ┌──────────── Subscriber<T> ────────────┐
//! Publisher<T> ──────►│ live set: id → SubscriptionPublisher  │
//!   send_data(v)      └──┬──────────────┬──────────────┬──────┘
//!   send_error(e)        ▼              ▼              ▼
//!                  Subscription    Subscription    Subscription ──► map / wrap / merge
//! ```
//!
//! ## Building blocks
//! - [`new_subscriber`]: broker pair; [`Subscription::new`]: standalone channel.
//! - [`Publish`]: common publishing trait ([`Publisher`], [`SubscriptionPublisher`], [`Throttle`]).
//! - [`Subscribe`]: common subscribing trait ([`Subscriber`], [`MergedSubscriber`]).
//! - [`process`], [`wrap`], [`map`], [`mux`], [`merge`], [`merge_subscribers`]: consumers and combinators.
//!
//! ## Consumer contract
//! Stop reading once `recv` returns an error; that error is the subscription's
//! cause. A closed data channel is never used as an end-of-stream marker.

mod combinators;
mod done;
mod merge;
mod options;
mod publish;
mod subscriber;
mod subscription;
mod throttle;

pub use combinators::{map, mux, process, wrap};
pub use merge::{merge, merge_subscribers, take_any, MergedSubscriber};
pub use options::{SubscriberOptions, SubscriptionOptions};
pub use publish::Publish;
pub use subscriber::{new_subscriber, Publisher, Subscribe, Subscriber};
pub use subscription::{Subscription, SubscriptionPublisher};
pub use throttle::Throttle;
