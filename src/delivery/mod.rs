//! # Delivery: content batches to a chat frontend.
//!
//! [`DeliveryPipeline`] subscribes to the content broker and sends every item
//! through a [`Deliver`] implementation (often a [`SendFn`] closure around a
//! bot client). Rate-limited sends are retried per
//! [`RetryPolicy`](crate::RetryPolicy); everything else is logged and skipped.

mod deliver;
mod error;
mod pipeline;

pub use deliver::{Deliver, SendFn};
pub use error::SendError;
pub use pipeline::{DeliveryOutcome, DeliveryPipeline};
