use std::sync::Arc;

use crate::accounts::{AccountService, AccountStore};
use crate::clock::Clock;
use crate::config::Config;
use crate::kv::KeyValueStore;
use crate::observability::Metrics;
use crate::provider::ProviderClient;
use crate::stats::{BucketAggregator, RefreshScheduler, StatsCache, UserRefreshCache};

/// Shared handles of every component, wired once at startup
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn KeyValueStore>,
    pub accounts: Arc<AccountService>,
    pub aggregator: Arc<BucketAggregator>,
    pub snapshots: Arc<UserRefreshCache>,
    pub scheduler: Arc<RefreshScheduler>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn ProviderClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let account_store = AccountStore::new(store.clone());

        let stats = Arc::new(StatsCache::new(
            store.clone(),
            provider.clone(),
            clock.clone(),
            config.cache.bucket_stats_ttl(),
            metrics.clone(),
        ));
        let snapshots = Arc::new(UserRefreshCache::new(
            store.clone(),
            config.cache.user_buckets_ttl(),
            metrics.clone(),
        ));
        let aggregator = Arc::new(BucketAggregator::new(
            provider.clone(),
            stats.clone(),
            snapshots.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            account_store.clone(),
            provider.clone(),
            stats.clone(),
            store.clone(),
            clock.clone(),
            config.cache.refresh_summary_ttl(),
            metrics.clone(),
        ));
        let accounts = Arc::new(AccountService::new(
            account_store,
            provider,
            stats,
            snapshots.clone(),
            clock,
        ));

        Self {
            config: Arc::new(config),
            store,
            accounts,
            aggregator,
            snapshots,
            scheduler,
            metrics,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.config.server.max_payload_bytes.as_usize()
    }
}
