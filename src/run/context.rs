//! # Hierarchical run context.
//!
//! A [`RunContext`] is one node of the supervision tree. It owns two task
//! groups and a cancellation cause, and shares the tree's health registry and
//! metrics.
//!
//! ```text
//!            cancel(cause)            (first cause wins)
//!                 │
//!                 ▼
//!   ┌─────── work group ───────┐      go(..), wait-parent, wait-child watchers
//!   │ cancel token, wait drain │
//!   └────────────┬─────────────┘
//!                ▼
//!   ┌────── cleanup group ─────┐      on_cancel(..), on_cancel_err(..)
//!   │ cancel token, wait drain │
//!   └────────────┬─────────────┘
//!                ▼
//!              done                   wait() / done() resolve
//! ```
//!
//! ## Rules
//! - Parent cancellation always cancels every child (cause: `Canceled`).
//! - A child started with [`RunContext::start`] that stops with a real failure
//!   cancels its parent with the same cause. Plain cancellation stays local.
//! - A task spawned with [`RunContext::go`] that returns a non-cancel error,
//!   or panics, cancels its context.
//! - Cleanup hooks observe the work group already stopped.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{HealthError, RunError};
use crate::metrics::RunMetrics;
use crate::run::activity::Activity;
use crate::run::health::{always_err, CheckResult, HealthChecker, Probe, ReadyFlag};

struct Group {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Group {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    async fn cancel_and_wait(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

struct Inner {
    name: String,
    work: Group,
    cleanup: Group,
    cause: OnceLock<RunError>,
    done: CancellationToken,
    health: Arc<HealthChecker>,
    ready: ReadyFlag,
    metrics: Arc<RunMetrics>,
}

/// Node of the supervision tree. Cloning shares the node.
#[derive(Clone)]
pub struct RunContext {
    inner: Arc<Inner>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("name", &self.inner.name)
            .field("cause", &self.inner.cause.get())
            .field("done", &self.inner.done.is_cancelled())
            .finish()
    }
}

impl RunContext {
    /// Creates the root of a run tree.
    ///
    /// The root owns a fresh health registry with one readiness check named
    /// after the root, which passes once [`RunContext::set_ready`] is called.
    pub fn root(name: impl Into<String>) -> Self {
        let ctx = Self::with_parts(
            name.into(),
            Arc::new(HealthChecker::new()),
            Arc::new(RunMetrics::new()),
        );
        ctx.inner
            .health
            .add_ready_check(ctx.inner.name.clone(), ctx.inner.ready.probe());
        ctx
    }

    fn with_parts(name: String, health: Arc<HealthChecker>, metrics: Arc<RunMetrics>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                work: Group::new(),
                cleanup: Group::new(),
                cause: OnceLock::new(),
                done: CancellationToken::new(),
                health,
                ready: ReadyFlag::default(),
                metrics,
            }),
        }
    }

    /// Creates a child node named `<self>/<name>`.
    ///
    /// The child is cancelled when this node starts cancelling. Its failures do
    /// not reach this node unless it was created through [`RunContext::start`].
    pub fn child(&self, name: &str) -> RunContext {
        let child = Self::with_parts(
            format!("{}/{}", self.inner.name, name),
            self.inner.health.clone(),
            self.inner.metrics.clone(),
        );

        let parent = self.inner.work.token.clone();
        if parent.is_cancelled() {
            child.cancel(RunError::Canceled);
            return child;
        }

        let node = child.clone();
        child.go("wait-parent", move |own| async move {
            tokio::select! {
                _ = own.cancelled() => {}
                _ = parent.cancelled() => node.cancel(RunError::Canceled),
            }
            Ok(())
        });
        child
    }

    /// Starts an activity on a new child context.
    ///
    /// On failure the child and this node are both cancelled with the returned
    /// cause, and the activity is registered as not ready and unhealthy. On
    /// success a watcher propagates any later non-cancel failure of the child
    /// to this node, and the activity's hooks become its health checks.
    pub async fn start<A>(&self, activity: Arc<A>)
    where
        A: Activity + ?Sized,
    {
        let child = self.child(activity.name());
        let name = child.name().to_owned();
        info!(activity = %name, "starting");

        if let Err(e) = activity.start(&child).await {
            child.cancel(e.clone());
            self.cancel(e.clone());
            self.add_failed_checks(&name);
            error!(activity = %name, error = %e, "failed to start");
            return;
        }

        let watched = child.clone();
        self.go(&format!("wait-child:{name}"), move |_| async move {
            watched.done().await;
            match watched.cause() {
                Some(cause) if !cause.is_canceled() => Err(cause),
                _ => Ok(()),
            }
        });
        self.add_checks(&name, activity);
        info!(activity = %name, "started");
    }

    fn add_failed_checks(&self, name: &str) {
        let health = &self.inner.health;
        health.add_ready_check(name, always_err(HealthError::NotReady));
        health.add_health_check(name, always_err(HealthError::Unhealthy));
    }

    fn add_checks<A>(&self, name: &str, activity: Arc<A>)
    where
        A: Activity + ?Sized,
    {
        let a = activity.clone();
        let ready: Probe = Arc::new(move || {
            let a = a.clone();
            async move { a.ready().await }.boxed()
        });
        let healthy: Probe = Arc::new(move || {
            let a = activity.clone();
            async move { a.healthy().await }.boxed()
        });
        self.inner.health.add_ready_check(name, ready);
        self.inner.health.add_health_check(name, healthy);
    }

    /// Runs `f` in the work group.
    ///
    /// `f` receives the work-group token. Skipped if the node is already
    /// cancelling. A non-cancel error or a panic cancels this node.
    pub fn go<F, Fut>(&self, name: &str, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        let work = &self.inner.work;
        if work.token.is_cancelled() {
            debug!(ctx = %self.inner.name, task = name, "not spawned: context cancelling");
            return;
        }

        let token = work.token.clone();
        let ctx = self.clone();
        let span = tracing::debug_span!("task", name = %format!("{}@{}", self.inner.name, name));

        work.tracker.spawn(
            async move {
                debug!("task started");
                let res = AssertUnwindSafe(async move { f(token).await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(RunError::fatal(format!(
                            "task panicked: {}",
                            panic_message(&*panic)
                        )))
                    });

                match res {
                    Ok(()) => debug!("task stopped"),
                    Err(e) if e.is_canceled() => debug!("task stopped"),
                    Err(e) => {
                        warn!(error = %e, "task failed");
                        ctx.cancel(e);
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Cancels this node with `cause`. Only the first call has an effect.
    ///
    /// Shutdown runs in the background: the work group is cancelled and
    /// drained, then the cleanup group, then the node is marked done.
    pub fn cancel(&self, cause: RunError) {
        if self.inner.cause.set(cause.clone()).is_err() {
            return;
        }
        let ctx = self.clone();
        let span = tracing::debug_span!("task", name = %format!("{}@cancel", self.inner.name));
        tokio::spawn(async move { ctx.shutdown(cause).await }.instrument(span));
    }

    async fn shutdown(&self, cause: RunError) {
        let name = &self.inner.name;
        if cause.is_canceled() {
            info!(ctx = %name, "stopping");
        } else {
            warn!(ctx = %name, error = %cause, "stopping");
        }

        self.inner.work.cancel_and_wait().await;
        self.inner.cleanup.cancel_and_wait().await;
        self.inner.done.cancel();

        info!(ctx = %name, cause = cause.as_label(), "stopped");
    }

    /// Cancels this node if `res` is an error; passes the value through otherwise.
    pub fn cancel_if_err<T>(&self, res: Result<T, RunError>) -> Option<T> {
        match res {
            Ok(v) => Some(v),
            Err(e) => {
                self.cancel(e);
                None
            }
        }
    }

    /// Registers a cleanup hook that runs after the work group has drained.
    pub fn on_cancel<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_cancel_err(move |_| f());
    }

    /// Like [`RunContext::on_cancel`], with the cancellation cause.
    pub fn on_cancel_err<F, Fut>(&self, f: F)
    where
        F: FnOnce(RunError) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.inner.cleanup.token.clone();
        let ctx = self.clone();
        let span = tracing::debug_span!("task", name = %format!("{}@on-cancel", self.inner.name));

        self.inner.cleanup.tracker.spawn(
            async move {
                token.cancelled().await;
                let cause = ctx.cause().unwrap_or(RunError::Canceled);
                let hook = AssertUnwindSafe(async move { f(cause).await });
                if let Err(panic) = hook.catch_unwind().await {
                    error!(panic = %panic_message(&*panic), "cleanup hook panicked");
                }
            }
            .instrument(span),
        );
    }

    /// Marks the root readiness check as passing.
    pub fn set_ready(&self) {
        self.inner.ready.set();
    }

    /// Readiness of the whole tree, sorted by name.
    pub async fn readiness(&self) -> Vec<CheckResult> {
        self.inner.health.readiness().await
    }

    /// Liveness of the whole tree, sorted by name.
    pub async fn liveness(&self) -> Vec<CheckResult> {
        self.inner.health.liveness().await
    }

    /// Hierarchical name (`root/child/..`).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Work-group token; cancelled as soon as shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.inner.work.token.clone()
    }

    /// Resolves once the node is fully stopped.
    pub async fn done(&self) {
        self.inner.done.cancelled().await
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// The sticky cancellation cause, once set.
    pub fn cause(&self) -> Option<RunError> {
        self.inner.cause.get().cloned()
    }

    /// Waits until done; `Ok` for a plain cancellation, the cause otherwise.
    pub async fn wait(&self) -> Result<(), RunError> {
        self.done().await;
        match self.cause() {
            Some(cause) if !cause.is_canceled() => Err(cause),
            _ => Ok(()),
        }
    }

    /// Counters shared by the whole tree.
    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.inner.metrics
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
