use std::future::Future;

use async_trait::async_trait;

use crate::delivery::error::SendError;
use crate::feed::ThreadId;

/// Frontend-side send capability (`send(thread, text)`).
#[async_trait]
pub trait Deliver: Send + Sync + 'static {
    async fn send(&self, thread_id: ThreadId, text: &str) -> Result<(), SendError>;
}

/// Closure-backed [`Deliver`].
///
/// # Example
/// ```
/// use feedvisor::{Deliver, SendError, SendFn};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let send = SendFn::new(|thread_id: i64, text: String| async move {
///     if text.is_empty() {
///         return Err(SendError::failed("empty message"));
///     }
///     println!("{thread_id}: {text}");
///     Ok(())
/// });
/// assert!(send.send(1, "hello").await.is_ok());
/// # }
/// ```
pub struct SendFn<F> {
    f: F,
}

impl<F> SendFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Deliver for SendFn<F>
where
    F: Fn(ThreadId, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SendError>> + Send + 'static,
{
    async fn send(&self, thread_id: ThreadId, text: &str) -> Result<(), SendError> {
        (self.f)(thread_id, text.to_owned()).await
    }
}
