//! # Health-check registry.
//!
//! One [`HealthChecker`] is shared by a whole run tree. Every started activity
//! contributes one readiness check and one liveness check under its
//! hierarchical name; the root contributes a readiness check backed by
//! [`RunContext::set_ready`](crate::RunContext::set_ready).
//!
//! ## Rules
//! - Results are always sorted by check name.
//! - **Readiness** is sticky: once a check reports ok it is never probed again.
//! - **Liveness** is probed on every call.
//! - Probes run without holding the registry lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::HealthError;

/// Future returned by a health probe.
pub type ProbeFuture = BoxFuture<'static, Result<(), HealthError>>;

/// A named health probe.
pub type Probe = Arc<dyn Fn() -> ProbeFuture + Send + Sync>;

/// Outcome of one check, as exposed by health endpoints.
///
/// Serializes as `{"name": .., "ok": .., "error": ..}`; `error` is omitted when
/// the check passed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    /// Aggregate status: true only if there is at least one check and all pass.
    ///
    /// # Example
    /// ```
    /// use feedvisor::CheckResult;
    ///
    /// assert!(!CheckResult::all_ok(&[]));
    /// ```
    pub fn all_ok(results: &[CheckResult]) -> bool {
        !results.is_empty() && results.iter().all(|r| r.ok)
    }
}

struct Check {
    name: String,
    probe: Probe,
    last: Mutex<Option<String>>,
    ok: AtomicBool,
}

impl Check {
    async fn update(&self) {
        match (self.probe)().await {
            Ok(()) => {
                self.ok.store(true, Ordering::Release);
                *self.last.lock() = None;
            }
            Err(e) => {
                self.ok.store(false, Ordering::Release);
                *self.last.lock() = Some(e.to_string());
            }
        }
    }

    fn result(&self) -> CheckResult {
        let error = self.last.lock().clone();
        let ok = self.ok.load(Ordering::Acquire);
        CheckResult {
            name: self.name.clone(),
            ok,
            error: if ok { None } else { error },
        }
    }
}

/// Readiness and liveness checks of a run tree.
#[derive(Default)]
pub struct HealthChecker {
    ready: Mutex<Vec<Arc<Check>>>,
    live: Mutex<Vec<Arc<Check>>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a readiness check.
    pub fn add_ready_check(&self, name: impl Into<String>, probe: Probe) {
        insert_sorted(&self.ready, name.into(), probe);
    }

    /// Registers a liveness check.
    pub fn add_health_check(&self, name: impl Into<String>, probe: Probe) {
        insert_sorted(&self.live, name.into(), probe);
    }

    /// Evaluates readiness; checks that already passed are not probed again.
    pub async fn readiness(&self) -> Vec<CheckResult> {
        let checks = self.ready.lock().clone();
        let mut out = Vec::with_capacity(checks.len());
        for check in checks {
            if !check.ok.load(Ordering::Acquire) {
                check.update().await;
            }
            out.push(check.result());
        }
        out
    }

    /// Evaluates liveness; every check is probed.
    pub async fn liveness(&self) -> Vec<CheckResult> {
        let checks = self.live.lock().clone();
        let mut out = Vec::with_capacity(checks.len());
        for check in checks {
            check.update().await;
            out.push(check.result());
        }
        out
    }
}

fn insert_sorted(list: &Mutex<Vec<Arc<Check>>>, name: String, probe: Probe) {
    let check = Arc::new(Check {
        name,
        probe,
        last: Mutex::new(None),
        ok: AtomicBool::new(false),
    });
    let mut list = list.lock();
    let pos = list.partition_point(|c| c.name <= check.name);
    list.insert(pos, check);
}

/// Probe that always fails with `err`.
pub fn always_err(err: HealthError) -> Probe {
    Arc::new(move || {
        let err = err.clone();
        async move { Err::<(), _>(err) }.boxed()
    })
}

/// One-way readiness flag.
#[derive(Clone, Debug, Default)]
pub struct ReadyFlag(Arc<AtomicBool>);

impl ReadyFlag {
    /// Marks ready. There is no way back.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Probe reporting [`HealthError::NotReady`] until [`ReadyFlag::set`].
    pub fn probe(&self) -> Probe {
        let flag = self.clone();
        Arc::new(move || {
            let ready = flag.is_set();
            async move {
                if ready {
                    Ok(())
                } else {
                    Err(HealthError::NotReady)
                }
            }
            .boxed()
        })
    }
}
