use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::feed::error::FeedError;
use crate::feed::ThreadId;

/// One delivery unit: a message for a thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    pub thread_id: ThreadId,
}

impl Content {
    pub fn new(thread_id: ThreadId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thread_id,
        }
    }
}

/// A persisted feed subscription.
///
/// Stored as JSON; `interval` is encoded in nanoseconds and `id` is assigned
/// by the store, so it is never written into the record body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSubscription {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub name: String,
    #[serde(with = "interval_nanos")]
    pub interval: Duration,
    pub thread_id: ThreadId,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl FeedSubscription {
    /// Index key: the lowercased name.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn encode(&self) -> Result<Vec<u8>, FeedError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a stored record and attaches the store's `id`.
    pub fn decode(id: &str, bytes: &[u8]) -> Result<Self, FeedError> {
        let mut record: FeedSubscription = serde_json::from_slice(bytes)?;
        record.id = id.to_owned();
        Ok(record)
    }
}

mod interval_nanos {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(d)?))
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(d)?;
    Ok(value.filter(|s| !s.is_empty()))
}
