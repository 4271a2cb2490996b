//! The publishing side of every broker primitive.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;

/// Sink for values and for a terminal error.
///
/// Implemented by [`Publisher`](crate::Publisher) (fan-out to every live
/// subscription), [`SubscriptionPublisher`](crate::SubscriptionPublisher) (one
/// subscription) and [`Throttle`](crate::Throttle).
#[async_trait]
pub trait Publish<T: Send + 'static>: Send + Sync {
    /// Delivers `data`. Fails once `token` is cancelled.
    async fn send_data(&self, token: &CancellationToken, data: T) -> Result<(), RunError>;

    /// Closes the receiving side(s) with `err`.
    fn send_error(&self, err: RunError);
}
