use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::accounts::Account;
use crate::clock::Clock;
use crate::kv::keys::bucket_stats_key;
use crate::kv::{self, KeyValueStore, VersionedRecord};
use crate::observability::Metrics;
use crate::provider::{ProviderClient, ProviderError};

/// Cached statistics for one (account, bucket) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStat {
    pub object_count: u64,
    pub total_size_bytes: u64,
    pub fetched_at: DateTime<Utc>,
}

impl BucketStat {
    pub fn zero(at: DateTime<Utc>) -> Self {
        Self {
            object_count: 0,
            total_size_bytes: 0,
            fetched_at: at,
        }
    }
}

impl VersionedRecord for BucketStat {
    const KIND: &'static str = "bucket-stat";
    const SCHEMA_VERSION: u32 = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatSource {
    Cache,
    Provider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatLookup {
    pub stat: BucketStat,
    pub source: StatSource,
}

/// Per-bucket statistics cache with a fixed freshness window
///
/// A lookup costs one store read, plus one provider call and one store write
/// when the entry is missing, stale or a refresh is forced.
pub struct StatsCache {
    store: Arc<dyn KeyValueStore>,
    provider: Arc<dyn ProviderClient>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    metrics: Arc<Metrics>,
}

impl StatsCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn ProviderClient>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            ttl,
            metrics,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached stat for a bucket, fresh or not. Store failures read as absent.
    pub async fn cached(&self, account_external_id: &str, bucket_name: &str) -> Option<BucketStat> {
        let key = bucket_stats_key(account_external_id, bucket_name);
        match kv::load_record::<BucketStat>(self.store.as_ref(), &key).await {
            Ok(stat) => stat,
            Err(e) => {
                warn!(key = %key, error = %e, "Stats cache read failed, treating as miss");
                None
            }
        }
    }

    /// Return the cached stat when fresh, otherwise fetch and store a new one
    ///
    /// Provider failures are returned to the caller; store failures are
    /// logged and treated as a miss (read) or a no-op (write).
    pub async fn try_get_or_refresh(
        &self,
        account: &Account,
        bucket_name: &str,
        force_refresh: bool,
    ) -> Result<StatLookup, ProviderError> {
        let now = self.clock.now();
        let previous = self.cached(&account.external_id, bucket_name).await;

        if let Some(stat) = previous.filter(|stat| !force_refresh && self.is_fresh(stat, now)) {
            self.metrics.stats_cache_hit();
            debug!(account_id = %account.external_id, bucket = bucket_name, "Stats cache hit");
            return Ok(StatLookup {
                stat,
                source: StatSource::Cache,
            });
        }

        self.metrics.stats_cache_miss();
        let usage = self
            .provider
            .bucket_stats(&account.external_id, &account.credential, bucket_name)
            .await
            .inspect_err(|_| self.metrics.provider_failure())?;

        // fetched_at never moves backwards for a key
        let fetched_at = previous.map_or(now, |p| p.fetched_at.max(now));
        let stat = BucketStat {
            object_count: usage.object_count,
            total_size_bytes: usage.total_size_bytes,
            fetched_at,
        };

        let key = bucket_stats_key(&account.external_id, bucket_name);
        if let Err(e) = kv::save_record(self.store.as_ref(), &key, &stat, Some(self.ttl)).await {
            warn!(key = %key, error = %e, "Stats cache write failed");
        }

        debug!(
            account_id = %account.external_id,
            bucket = bucket_name,
            objects = stat.object_count,
            bytes = stat.total_size_bytes,
            forced = force_refresh,
            "Fetched bucket stats"
        );

        Ok(StatLookup {
            stat,
            source: StatSource::Provider,
        })
    }

    /// Like [`Self::try_get_or_refresh`], but a provider failure yields a
    /// zero-valued stat so one bucket can never abort a batch
    pub async fn get_or_refresh(&self, account: &Account, bucket_name: &str, force_refresh: bool) -> BucketStat {
        match self.try_get_or_refresh(account, bucket_name, force_refresh).await {
            Ok(lookup) => lookup.stat,
            Err(e) => {
                warn!(
                    account_id = %account.external_id,
                    bucket = bucket_name,
                    error = %e,
                    "Bucket stats unavailable, reporting zero"
                );
                BucketStat::zero(self.clock.now())
            }
        }
    }

    /// Drop a cached stat; `true` when a live entry was actually removed
    pub async fn invalidate(&self, account_external_id: &str, bucket_name: &str) -> kv::Result<bool> {
        let key = bucket_stats_key(account_external_id, bucket_name);
        let removed = self.store.delete(&key).await?;
        debug!(key = %key, removed, "Invalidated bucket stats");
        Ok(removed)
    }

    fn is_fresh(&self, stat: &BucketStat, now: DateTime<Utc>) -> bool {
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(stat.fetched_at) < ttl
    }
}
