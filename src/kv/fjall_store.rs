use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;

use super::error::{KvError, Result};
use super::pruning::{PurgeStats, purge_expired};
use super::{Entry, KeyValueStore};

/// Fjall-backed persistent key-value store
///
/// Writes go through `write_lock` so that removing an expired entry cannot
/// race with a put of a fresh value under the same key.
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    kv: PartitionHandle,
    clock: Arc<dyn Clock>,
    write_lock: Arc<Mutex<()>>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let kv = keyspace.open_partition("kv", PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self {
            keyspace,
            kv,
            clock,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn read_entry(&self, key: &str) -> Result<Option<Entry>> {
        match self.kv.get(key)? {
            Some(raw) => {
                let entry: Entry = serde_json::from_slice(&raw)?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KeyValueStore for FjallStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(entry) = self.read_entry(key)? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if !entry.is_expired(now) {
            return Ok(Some(entry.value));
        }

        let _guard = self.write_lock.lock().await;
        match self.read_entry(key)? {
            Some(current) if !current.is_expired(now) => Ok(Some(current.value)),
            Some(_) => {
                debug!(key, "Key expired, removing");
                self.kv.remove(key.as_bytes())?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::InvalidKey("empty key".to_string()));
        }

        let entry = Entry::new(value, ttl, self.clock.now());
        let _guard = self.write_lock.lock().await;
        self.kv.insert(key.as_bytes(), serde_json::to_vec(&entry)?)?;
        debug!(key, ttl_secs = ttl.map(|t| t.as_secs()), "Stored key");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        let _guard = self.write_lock.lock().await;

        let live = match self.read_entry(key) {
            Ok(entry) => entry.is_some_and(|entry| !entry.is_expired(now)),
            Err(KvError::Serialization(e)) => {
                warn!(key, error = %e, "Deleting unreadable entry");
                false
            }
            Err(e) => return Err(e),
        };
        self.kv.remove(key.as_bytes())?;
        debug!(key, live, "Deleted key");
        Ok(live)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let mut keys = Vec::new();

        for item in self.kv.prefix(prefix) {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|_| KvError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?;

            match serde_json::from_slice::<Entry>(&value) {
                Ok(entry) if entry.is_expired(now) => continue,
                Ok(_) => keys.push(key),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable entry"),
            }
        }

        Ok(keys)
    }

    async fn purge_expired(&self) -> Result<PurgeStats> {
        let stats = {
            let _guard = self.write_lock.lock().await;
            purge_expired(&self.kv, self.clock.now())?
        };
        self.persist()?;
        Ok(stats)
    }
}
