//! Per-user bucket list snapshots serving the fast read path

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::kv::keys::{last_api_refresh_key, user_buckets_key};
use crate::kv::{self, KeyValueStore, VersionedRecord};
use crate::observability::Metrics;

/// One bucket row of an aggregated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub name: String,
    pub account_id: String,
    pub account_name: String,
    pub object_count: u64,
    pub total_size_bytes: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Latest aggregated bucket listing of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedBucketList {
    pub buckets: Vec<BucketSummary>,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl AggregatedBucketList {
    pub fn total_size_bytes(&self) -> u64 {
        self.buckets
            .iter()
            .fold(0u64, |total, b| total.saturating_add(b.total_size_bytes))
    }
}

impl VersionedRecord for AggregatedBucketList {
    const KIND: &'static str = "user-buckets";
    const SCHEMA_VERSION: u32 = 1;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RefreshMarker {
    refreshed_at: DateTime<Utc>,
}

impl VersionedRecord for RefreshMarker {
    const KIND: &'static str = "api-refresh";
    const SCHEMA_VERSION: u32 = 1;
}

/// Coarse cache of whole bucket listings, keyed by user
///
/// Reads never reach the provider. Store failures are logged and read as
/// absent, which sends the caller down the slow path.
pub struct UserRefreshCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    metrics: Arc<Metrics>,
}

impl UserRefreshCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration, metrics: Arc<Metrics>) -> Self {
        Self { store, ttl, metrics }
    }

    pub async fn read_cached(&self, user_id: &str) -> Option<AggregatedBucketList> {
        let key = user_buckets_key(user_id);
        match kv::load_record(self.store.as_ref(), &key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(user_id, error = %e, "Snapshot read failed, treating as absent");
                None
            }
        }
    }

    pub async fn store(&self, user_id: &str, snapshot: &AggregatedBucketList) {
        let key = user_buckets_key(user_id);
        match kv::save_record(self.store.as_ref(), &key, snapshot, Some(self.ttl)).await {
            Ok(()) => {
                self.metrics.snapshot_written();
                debug!(user_id, buckets = snapshot.buckets.len(), "Stored bucket snapshot");
            }
            Err(e) => warn!(user_id, error = %e, "Snapshot write failed"),
        }
    }

    /// Drop the user's snapshot so the next read rebuilds it
    pub async fn invalidate(&self, user_id: &str) {
        if let Err(e) = self.store.delete(&user_buckets_key(user_id)).await {
            warn!(user_id, error = %e, "Snapshot delete failed");
        }
    }

    pub async fn record_api_refresh(&self, user_id: &str, at: DateTime<Utc>) {
        let marker = RefreshMarker { refreshed_at: at };
        if let Err(e) = kv::save_record(self.store.as_ref(), &last_api_refresh_key(user_id), &marker, None).await {
            warn!(user_id, error = %e, "Failed to record refresh time");
        }
    }

    pub async fn last_api_refresh(&self, user_id: &str) -> Option<DateTime<Utc>> {
        match kv::load_record::<RefreshMarker>(self.store.as_ref(), &last_api_refresh_key(user_id)).await {
            Ok(marker) => marker.map(|m| m.refreshed_at),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read refresh time");
                None
            }
        }
    }
}
