use std::time::Duration;

use thiserror::Error;

/// # Errors returned by a frontend send function.
///
/// Only [`SendError::RateLimited`] is retried by the
/// [`DeliveryPipeline`](crate::DeliveryPipeline).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The frontend throttled us.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited {
        /// Wait advertised by the frontend, if any.
        retry_after: Option<Duration>,
    },

    /// Any other failure; not retried.
    #[error("send failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {d:?}"))
        .unwrap_or_default()
}

impl SendError {
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        SendError::RateLimited { retry_after }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        SendError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SendError::RateLimited { .. } => "send_rate_limited",
            SendError::Failed { .. } => "send_failed",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SendError::RateLimited { .. })
    }

    /// Advertised wait of a rate-limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SendError::RateLimited { retry_after } => *retry_after,
            SendError::Failed { .. } => None,
        }
    }
}
