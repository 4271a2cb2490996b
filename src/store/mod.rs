//! # Key/value persistence collaborator.
//!
//! The feed engine and the dedup filter only see the narrow [`Store`] trait:
//!
//! - plain keys with optional TTL (`get` / `set`), used for seen markers;
//! - tables of records with store-assigned ids (`add` / `list` / `delete`),
//!   used for persisted feed subscriptions.
//!
//! The backing implementation is external; [`MemoryStore`] is the in-process
//! reference used by tests and single-process deployments.

mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;

/// # Errors returned by a [`Store`].
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Key or table does not exist.
    #[error("not found: {key}")]
    NotFound {
        /// The missing key or table.
        key: String,
    },

    /// Backend could not serve the request.
    #[error("store unavailable: {error}")]
    Unavailable {
        /// The underlying error message.
        error: String,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "store_not_found",
            StoreError::Unavailable { .. } => "store_unavailable",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Persistence consumed by the feed engine. Implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Value of `key`, or [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Stores `value` under `key`; `ttl = None` keeps it forever.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Appends a record to `table` and returns its new id.
    async fn add(&self, table: &str, value: Vec<u8>) -> Result<String, StoreError>;

    /// Every record of `table` by id.
    async fn list(&self, table: &str) -> Result<HashMap<String, Vec<u8>>, StoreError>;

    /// Removes record `id` from `table`. Removing a missing record is not an error.
    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError>;

    /// True if `err` means "absent" for this backend.
    fn is_not_found(&self, err: &StoreError) -> bool {
        err.is_not_found()
    }
}
