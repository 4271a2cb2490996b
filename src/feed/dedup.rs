//! Seen-item suppression for feeders.
//!
//! An item is announced at most once per marker lifetime:
//!
//! ```text
//! is_new(scope, id, published)
//!   marker "<feed>:<scope>:posts:<id>" present?  ── yes ──► seen
//!   published missing or older than staleness?   ── yes ──► seen
//!   otherwise                                    ────────► new
//! ```
//!
//! Feeders call [`SeenFilter::mark_seen`] after deciding to announce an item;
//! the marker expires after `ttl`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::DedupConfig;
use crate::feed::error::FeedError;
use crate::store::{Store, StoreError};

/// Dedup helper bound to one feed.
#[derive(Clone)]
pub struct SeenFilter {
    store: Arc<dyn Store>,
    feed: String,
    config: DedupConfig,
}

#[derive(Serialize)]
struct Marker<'a, V: Serialize> {
    seen_at: DateTime<Utc>,
    item: &'a V,
}

impl SeenFilter {
    pub fn new(store: Arc<dyn Store>, feed: impl Into<String>, config: DedupConfig) -> Self {
        Self {
            store,
            feed: feed.into(),
            config,
        }
    }

    /// Store key of an item marker.
    pub fn key(&self, scope: &str, id: &str) -> String {
        format!("{}:{}:posts:{}", self.feed, scope, id)
    }

    /// True if an item published at `published` is too old to announce.
    /// Items without a timestamp are treated as stale.
    pub fn is_stale(&self, published: Option<DateTime<Utc>>) -> bool {
        let Some(published) = published else {
            return true;
        };
        match (Utc::now() - published).to_std() {
            Ok(age) => age > self.config.staleness,
            // published in the future
            Err(_) => false,
        }
    }

    /// True if the item has no marker and is fresh enough to announce.
    pub async fn is_new(
        &self,
        scope: &str,
        id: &str,
        published: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        if self.is_stale(published) {
            return Ok(false);
        }
        match self.store.get(&self.key(scope, id)).await {
            Ok(_) => Ok(false),
            Err(e) if self.store.is_not_found(&e) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Records `item` as announced for the configured TTL.
    pub async fn mark_seen<V: Serialize + Sync>(&self, scope: &str, id: &str, item: &V) -> Result<(), FeedError> {
        let marker = Marker {
            seen_at: Utc::now(),
            item,
        };
        let value = serde_json::to_vec(&marker)?;
        self.store
            .set(&self.key(scope, id), value, Some(self.config.ttl))
            .await?;
        Ok(())
    }

    /// [`is_new`](Self::is_new) followed by [`mark_seen`](Self::mark_seen) for new items.
    pub async fn check_and_mark<V: Serialize + Sync>(
        &self,
        scope: &str,
        id: &str,
        published: Option<DateTime<Utc>>,
        item: &V,
    ) -> Result<bool, FeedError> {
        if !self.is_new(scope, id, published).await? {
            debug!(feed = %self.feed, scope, id, "skipping seen item");
            return Ok(false);
        }
        self.mark_seen(scope, id, item).await?;
        Ok(true)
    }
}
