//! Key-value persistence shared by every component
//!
//! The store is the only shared mutable resource in bucketwatch. It offers
//! single-key `get`/`put`/`delete` plus prefix listing, with an optional TTL
//! per key. There are no transactions: concurrent writers to the same key are
//! last-write-wins.
//!
//! Two backends implement [`KeyValueStore`]:
//!
//! - [`FjallStore`]: embedded LSM store used by the server
//! - [`MemoryStore`]: process-local map for tests and `--in-memory` runs
//!
//! TTLs are enforced on read (an expired key reads as absent and is removed)
//! and by [`KeyValueStore::purge_expired`], which the periodic refresh job
//! calls after each run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bucketwatch::kv::{FjallStore, KeyValueStore};
//!
//! let store = FjallStore::open("data/kv", clock)?;
//! store.put("user:42", payload, Some(Duration::from_secs(3600))).await?;
//! let value = store.get("user:42").await?;
//! ```

pub mod error;
pub mod fjall_store;
pub mod keys;
pub mod memory;
pub mod pruning;
pub mod record;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::{KvError, Result};
pub use fjall_store::FjallStore;
pub use memory::MemoryStore;
pub use pruning::PurgeStats;
pub use record::VersionedRecord;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value and TTL
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Remove `key`; returns whether a live (unexpired) entry was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Live keys starting with `prefix`, in key order
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every expired key
    async fn purge_expired(&self) -> Result<PurgeStats> {
        Ok(PurgeStats::default())
    }
}

/// Load a versioned record; foreign or corrupt payloads read as absent
pub async fn load_record<T: VersionedRecord>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    Ok(store
        .get(key)
        .await?
        .and_then(|raw| record::decode::<T>(key, &raw)))
}

pub async fn save_record<T: VersionedRecord>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let raw = record::encode(value)?;
    store.put(key, raw, ttl).await
}

/// Stored form of a value together with its expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
}

impl Entry {
    pub fn new(value: String, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expires_at_ms = ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now.timestamp_millis().saturating_add(ttl_ms)
        });
        Self {
            value,
            expires_at_ms,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_ms
            .is_some_and(|expires_at| now.timestamp_millis() >= expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry() {
        let now = Utc::now();
        let entry = Entry::new("v".into(), Some(Duration::from_secs(60)), now);

        assert!(!entry.is_expired(now));
        assert!(!entry.is_expired(now + chrono::Duration::seconds(59)));
        assert!(entry.is_expired(now + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let now = Utc::now();
        let entry = Entry::new("v".into(), None, now);
        assert!(!entry.is_expired(now + chrono::Duration::days(3650)));
    }
}
