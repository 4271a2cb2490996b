//! Error types shared by the run tree and the pub/sub broker.
//!
//! This module defines two enums:
//!
//! - [`RunError`]: the *cause* attached to a cancelled [`RunContext`](crate::RunContext)
//!   or a closed [`Subscription`](crate::Subscription).
//! - [`HealthError`]: the failure reported by a readiness or liveness check.
//!
//! Both provide `as_label` for logs/metrics. Feed, store and delivery errors live
//! next to the code that raises them.

use std::fmt::Display;

use thiserror::Error;

/// # Cause carried by a cancelled context or a closed subscription.
///
/// The first cause recorded on a node wins; later ones are ignored.
/// [`RunError::Canceled`] is the normal, silent termination cause and is never
/// propagated upward as a failure.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Stopped on request (explicit cancel, parent shutdown, dropped handle).
    #[error("context cancelled")]
    Canceled,

    /// Unit of work failed; the owning subtree is torn down.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; retry helpers stop on it.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// A channel feeding a subscription went away.
    #[error("subscription {name:?} closed")]
    Closed {
        /// Name of the closed subscription.
        name: String,
    },
}

impl RunError {
    /// Builds a [`RunError::Fail`] from any displayable error.
    pub fn fail(error: impl Display) -> Self {
        RunError::Fail {
            error: error.to_string(),
        }
    }

    /// Builds a [`RunError::Fatal`] from any displayable error.
    pub fn fatal(error: impl Display) -> Self {
        RunError::Fatal {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use feedvisor::RunError;
    ///
    /// assert_eq!(RunError::Canceled.as_label(), "run_canceled");
    /// assert_eq!(RunError::fail("boom").as_label(), "run_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Canceled => "run_canceled",
            RunError::Fail { .. } => "run_failed",
            RunError::Fatal { .. } => "run_fatal",
            RunError::Closed { .. } => "run_closed",
        }
    }

    /// True for the plain cancellation cause.
    pub fn is_canceled(&self) -> bool {
        matches!(self, RunError::Canceled)
    }

    /// True if retrying cannot help.
    ///
    /// # Example
    /// ```
    /// use feedvisor::RunError;
    ///
    /// assert!(RunError::fatal("bad credentials").is_fatal());
    /// assert!(!RunError::Canceled.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunError::Fatal { .. })
    }
}

/// # Failure reported by a health check.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    /// Component has not finished starting.
    #[error("not ready")]
    NotReady,

    /// Component cannot make progress.
    #[error("unhealthy")]
    Unhealthy,

    /// Check-specific failure.
    #[error("{error}")]
    Check {
        /// The underlying error message.
        error: String,
    },
}

impl HealthError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HealthError::NotReady => "health_not_ready",
            HealthError::Unhealthy => "health_unhealthy",
            HealthError::Check { .. } => "health_check_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_stable() {
        assert_eq!(RunError::Canceled.to_string(), "context cancelled");
        assert_eq!(
            RunError::fail("boom").to_string(),
            "execution failed: boom"
        );
        assert_eq!(
            RunError::Closed { name: "a".into() }.to_string(),
            "subscription \"a\" closed"
        );
        assert_eq!(HealthError::NotReady.to_string(), "not ready");
    }

    #[test]
    fn test_cancel_is_not_fatal() {
        assert!(RunError::Canceled.is_canceled());
        assert!(!RunError::fail("x").is_canceled());
        assert!(!RunError::fail("x").is_fatal());
    }
}
