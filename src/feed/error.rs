use thiserror::Error;

use crate::error::RunError;
use crate::store::StoreError;

/// # Errors raised while handling feed commands.
///
/// User errors (see [`FeedError::is_user_error`]) are also published back to
/// the command's thread as plain text; the rest are infrastructure failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Requested poll interval is below the configured minimum.
    #[error("interval must be at least {min_minutes} minutes")]
    InvalidInterval {
        /// Smallest accepted interval, in minutes.
        min_minutes: u64,
    },

    /// Requested poll interval is above the configured maximum.
    #[error("interval must be at most {max_minutes} minutes")]
    IntervalTooLong {
        /// Largest accepted interval, in minutes.
        max_minutes: u64,
    },

    /// Command text does not match the grammar.
    #[error("{feed}: {reason}")]
    InvalidCommand {
        /// Feed that parsed the command.
        feed: String,
        /// What was wrong.
        reason: String,
    },

    /// No subscription with that name.
    #[error("{feed}: subscription {name} not found")]
    NotFound { feed: String, name: String },

    /// A subscription with that name already exists.
    #[error("{feed}: subscription {name} already exists")]
    AlreadyExists { feed: String, name: String },

    /// No handler is registered for the command name.
    #[error("unknown command {name}")]
    UnknownCommand { name: String },

    /// Commands arrived before the engine was started.
    #[error("{feed}: engine not started")]
    NotStarted { feed: String },

    /// Persistence failed.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// A record could not be encoded or decoded.
    #[error("codec: {error}")]
    Codec { error: String },

    /// The content stream refused the reply.
    #[error("publish: {0}")]
    Publish(RunError),
}

impl FeedError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FeedError::InvalidInterval { .. } => "feed_invalid_interval",
            FeedError::IntervalTooLong { .. } => "feed_interval_too_long",
            FeedError::InvalidCommand { .. } => "feed_invalid_command",
            FeedError::NotFound { .. } => "feed_not_found",
            FeedError::AlreadyExists { .. } => "feed_already_exists",
            FeedError::UnknownCommand { .. } => "feed_unknown_command",
            FeedError::NotStarted { .. } => "feed_not_started",
            FeedError::Store(_) => "feed_store",
            FeedError::Codec { .. } => "feed_codec",
            FeedError::Publish(_) => "feed_publish",
        }
    }

    /// True for errors caused by the command's author rather than the system.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            FeedError::InvalidInterval { .. }
                | FeedError::IntervalTooLong { .. }
                | FeedError::InvalidCommand { .. }
                | FeedError::NotFound { .. }
                | FeedError::AlreadyExists { .. }
                | FeedError::UnknownCommand { .. }
        )
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Codec {
            error: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visible_messages() {
        assert_eq!(
            FeedError::InvalidInterval { min_minutes: 60 }.to_string(),
            "interval must be at least 60 minutes"
        );
        assert_eq!(
            FeedError::IntervalTooLong { max_minutes: 525_600 }.to_string(),
            "interval must be at most 525600 minutes"
        );
        assert!(FeedError::IntervalTooLong { max_minutes: 1 }.is_user_error());
        assert_eq!(
            FeedError::NotFound {
                feed: "rss".into(),
                name: "golang".into()
            }
            .to_string(),
            "rss: subscription golang not found"
        );
        assert!(FeedError::UnknownCommand { name: "/x".into() }.is_user_error());
        assert!(!FeedError::Store(StoreError::Unavailable { error: "down".into() }).is_user_error());
    }
}
