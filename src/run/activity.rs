//! # Activities: named units started under a [`RunContext`].
//!
//! An [`Activity`] is started with [`RunContext::start`]. It receives its own
//! child context (named `<parent>/<activity>`), spawns whatever long-lived work
//! it needs on that context and returns. Returning an error marks the activity
//! failed and tears the parent down.
//!
//! Readiness and liveness hooks default to ok; override them to surface a
//! component's real state on the health endpoints.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use feedvisor::{sleep, ActivityFn, RunContext};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let root = RunContext::root("app");
//! root.start(ActivityFn::arc("ticker", |ctx: RunContext| async move {
//!     while sleep(&ctx.token(), Duration::from_millis(10)).await.is_ok() {}
//!     Ok(())
//! }))
//! .await;
//!
//! root.cancel(feedvisor::RunError::Canceled);
//! assert!(root.wait().await.is_ok());
//! # }
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HealthError, RunError};
use crate::run::context::RunContext;

/// A named, independently startable unit of work.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Name used for the child context and the health checks.
    fn name(&self) -> &str;

    /// Starts the activity on its own child context.
    ///
    /// Long-running work belongs in `ctx.go(..)`; this call should return once
    /// the activity is set up.
    async fn start(&self, ctx: &RunContext) -> Result<(), RunError>;

    /// Readiness probe; cached by the registry once it passes.
    async fn ready(&self) -> Result<(), HealthError> {
        Ok(())
    }

    /// Liveness probe; evaluated on every health request.
    async fn healthy(&self) -> Result<(), HealthError> {
        Ok(())
    }
}

/// Closure-backed activity.
///
/// Each start calls the closure once with the activity's context and runs the
/// returned future in that context's work group.
pub struct ActivityFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ActivityFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the activity and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Activity for ActivityFn<F>
where
    F: Fn(RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RunError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: &RunContext) -> Result<(), RunError> {
        let fut = (self.f)(ctx.clone());
        ctx.go("run", move |_| fut);
        Ok(())
    }
}
