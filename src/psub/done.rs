//! Sticky "done with cause" signal shared by a subscription and its publishers.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::error::RunError;

/// Cancellation token plus the first error that closed it.
///
/// The token is a child of the token the subscription was created under, so a
/// parent cancellation closes it too; the cause then reads as
/// [`RunError::Canceled`].
#[derive(Debug)]
pub(crate) struct ErrorDone {
    token: CancellationToken,
    err: OnceLock<RunError>,
}

impl ErrorDone {
    pub(crate) fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            err: OnceLock::new(),
        }
    }

    /// Records `err` and closes. Only the first call has an effect.
    pub(crate) fn send_error(&self, err: RunError) {
        if self.token.is_cancelled() {
            self.err.get_or_init(|| RunError::Canceled);
            return;
        }
        if self.err.set(err).is_ok() {
            self.token.cancel();
        }
    }

    /// The cause, once closed.
    pub(crate) fn err(&self) -> Option<RunError> {
        if !self.token.is_cancelled() {
            return None;
        }
        Some(self.err.get_or_init(|| RunError::Canceled).clone())
    }

    /// The cause, or `Canceled` if not recorded yet.
    pub(crate) fn cause(&self) -> RunError {
        self.err().unwrap_or(RunError::Canceled)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }
}
