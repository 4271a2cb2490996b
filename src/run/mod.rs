//! # Supervision tree.
//!
//! [`RunContext`] nodes start [`Activity`]s, run tasks in a work group, run
//! cleanup hooks after the work group drained, and carry the cause of their
//! cancellation. Health checks of every started activity are aggregated in one
//! registry per tree.
//!
//! ```text
//! root ──► root/feeds ──► root/feeds/rss         (poll loops)
//!      └─► root/delivery                         (content consumer)
//!
//! failure of root/feeds/rss ──► root/feeds ──► root   (propagates up)
//! cancel(root)              ──► every descendant      (propagates down)
//! ```

mod activity;
mod context;
mod health;
mod helpers;

pub use activity::{Activity, ActivityFn};
pub use context::RunContext;
pub use health::{CheckResult, HealthChecker, Probe, ProbeFuture, ReadyFlag};
pub use helpers::{on_interval, periodically, retry, sleep};
