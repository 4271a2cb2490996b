use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::feed::subscription::FeedSubscription;

struct Entry {
    record: Arc<FeedSubscription>,
    cancel: CancellationToken,
}

/// In-memory subscription index keyed by lowercased name.
///
/// Owns each subscription's poll token; removal is the only way to cancel it.
/// The lock is held for map mutations only.
#[derive(Default)]
pub(crate) struct SubscriptionIndex {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl SubscriptionIndex {
    /// Inserts `record` with a poll token derived from `parent`.
    ///
    /// Returns the token the poll loop should observe, or `None` if the name
    /// is already taken.
    pub(crate) fn insert(
        &self,
        record: Arc<FeedSubscription>,
        parent: &CancellationToken,
    ) -> Option<CancellationToken> {
        let mut entries = self.entries.lock();
        let key = record.key();
        if entries.contains_key(&key) {
            return None;
        }
        let cancel = parent.child_token();
        let observed = cancel.clone();
        entries.insert(key, Entry { record, cancel });
        Some(observed)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<FeedSubscription>> {
        self.entries
            .lock()
            .get(&name.to_lowercase())
            .map(|e| e.record.clone())
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(&name.to_lowercase())
    }

    /// Removes the entry and cancels its poll loop.
    pub(crate) fn remove(&self, name: &str) -> Option<Arc<FeedSubscription>> {
        let entry = self.entries.lock().remove(&name.to_lowercase())?;
        entry.cancel.cancel();
        Some(entry.record)
    }

    /// Every record, ordered by key.
    pub(crate) fn records(&self) -> Vec<Arc<FeedSubscription>> {
        self.entries.lock().values().map(|e| e.record.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
