//! In-process [`Store`] with TTL on plain keys.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::store::{Store, StoreError};

#[derive(Default)]
struct State {
    keys: HashMap<String, (Vec<u8>, Option<Instant>)>,
    tables: HashMap<String, BTreeMap<String, Vec<u8>>>,
}

/// Thread-safe in-memory store.
///
/// - Expiry uses the tokio clock, so paused-time tests can advance past a TTL.
/// - Listing a table that was never written returns [`StoreError::NotFound`].
/// - [`MemoryStore::set_available`] makes every call fail with
///   [`StoreError::Unavailable`], for exercising outage paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    next_id: AtomicU64,
    down: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles the simulated outage.
    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::Release);
    }

    /// Number of records in `table`.
    pub fn table_len(&self, table: &str) -> usize {
        self.state.lock().tables.get(table).map_or(0, BTreeMap::len)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable {
                error: "memory store marked unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check()?;
        let mut state = self.state.lock();
        let expired = match state.keys.get(key) {
            None => true,
            Some((_, Some(deadline))) => *deadline <= Instant::now(),
            Some((_, None)) => false,
        };
        if expired {
            state.keys.remove(key);
            return Err(StoreError::NotFound { key: key.to_owned() });
        }
        state
            .keys
            .get(key)
            .map(|(value, _)| value.clone())
            .ok_or_else(|| StoreError::NotFound { key: key.to_owned() })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check()?;
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.state.lock().keys.insert(key.to_owned(), (value, deadline));
        Ok(())
    }

    async fn add(&self, table: &str, value: Vec<u8>) -> Result<String, StoreError> {
        self.check()?;
        let id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        self.state
            .lock()
            .tables
            .entry(table.to_owned())
            .or_default()
            .insert(id.clone(), value);
        Ok(id)
    }

    async fn list(&self, table: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        self.check()?;
        self.state
            .lock()
            .tables
            .get(table)
            .map(|rows| rows.iter().map(|(id, v)| (id.clone(), v.clone())).collect())
            .ok_or_else(|| StoreError::NotFound { key: table.to_owned() })
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        self.check()?;
        if let Some(rows) = self.state.lock().tables.get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }
}
