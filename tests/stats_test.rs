//! Cache, aggregation and refresh behaviour across components

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use bucketwatch::accounts::{Account, AccountService, AccountStore, UserRecord};
use bucketwatch::clock::{Clock, ManualClock};
use bucketwatch::kv::keys::bucket_stats_prefix;
use bucketwatch::kv::{self, KeyValueStore, KvError, MemoryStore};
use bucketwatch::observability::Metrics;
use bucketwatch::provider::{BucketUsage, MockProvider};
use bucketwatch::stats::{
    AggregateError, BucketAggregator, RefreshScheduler, StatSource, StatsCache, UserRefreshCache,
};

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(86400);

struct Harness {
    clock: ManualClock,
    store: Arc<MemoryStore>,
    provider: Arc<MockProvider>,
    metrics: Arc<Metrics>,
    stats: Arc<StatsCache>,
    snapshots: Arc<UserRefreshCache>,
    aggregator: BucketAggregator,
    scheduler: RefreshScheduler,
    accounts: AccountService,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::new(Utc::now());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(MemoryStore::new(shared_clock.clone()));
        let provider = Arc::new(MockProvider::new());
        let metrics = Arc::new(Metrics::new());

        let stats = Arc::new(StatsCache::new(
            store.clone(),
            provider.clone(),
            shared_clock.clone(),
            HOUR,
            metrics.clone(),
        ));
        let snapshots = Arc::new(UserRefreshCache::new(store.clone(), HOUR, metrics.clone()));
        let aggregator = BucketAggregator::new(
            provider.clone(),
            stats.clone(),
            snapshots.clone(),
            shared_clock.clone(),
            metrics.clone(),
        );
        let scheduler = RefreshScheduler::new(
            AccountStore::new(store.clone()),
            provider.clone(),
            stats.clone(),
            store.clone(),
            shared_clock.clone(),
            DAY,
            metrics.clone(),
        );
        let accounts = AccountService::new(
            AccountStore::new(store.clone()),
            provider.clone(),
            stats.clone(),
            snapshots.clone(),
            shared_clock,
        );

        Self {
            clock,
            store,
            provider,
            metrics,
            stats,
            snapshots,
            aggregator,
            scheduler,
            accounts,
        }
    }

    async fn put_user(&self, user_id: &str, accounts: Vec<Account>) {
        let mut user = UserRecord::new(user_id, self.clock.now());
        user.accounts = accounts;
        AccountStore::new(self.store.clone()).put_user(&user).await.unwrap();
    }
}

fn account(id: &str, external_id: &str, active: bool) -> Account {
    Account {
        id: id.into(),
        name: format!("Account {id}"),
        external_id: external_id.into(),
        credential: "token".into(),
        is_active: active,
        created_at: Utc::now(),
    }
}

fn sorted_names(buckets: &[bucketwatch::stats::BucketSummary]) -> Vec<&str> {
    let mut names: Vec<&str> = buckets.iter().map(|b| b.name.as_str()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_ttl_boundary() {
    let h = Harness::new();
    h.provider.add_bucket("ext-1", "photos", 5, 100);
    let acc = account("acc-1", "ext-1", true);

    let first = h.stats.try_get_or_refresh(&acc, "photos", false).await.unwrap();
    assert_eq!(first.source, StatSource::Provider);

    h.clock.advance(chrono::Duration::minutes(59));
    let at_59 = h.stats.try_get_or_refresh(&acc, "photos", false).await.unwrap();
    assert_eq!(at_59.source, StatSource::Cache);
    assert_eq!(at_59.stat, first.stat);
    assert_eq!(h.provider.stats_calls(), 1);

    h.clock.advance(chrono::Duration::minutes(2));
    let at_61 = h.stats.try_get_or_refresh(&acc, "photos", false).await.unwrap();
    assert_eq!(at_61.source, StatSource::Provider);
    assert!(at_61.stat.fetched_at > first.stat.fetched_at);
    assert_eq!(h.provider.stats_calls(), 2);
}

#[tokio::test]
async fn test_force_refresh_bypasses_fresh_entry() {
    let h = Harness::new();
    h.provider.add_bucket("ext-1", "photos", 5, 100);
    let acc = account("acc-1", "ext-1", true);

    h.stats.get_or_refresh(&acc, "photos", false).await;
    h.provider.set_usage(
        "ext-1",
        "photos",
        BucketUsage {
            object_count: 6,
            total_size_bytes: 150,
        },
    );

    for minutes in [0, 1, 30] {
        h.clock.advance(chrono::Duration::minutes(minutes));
        let lookup = h.stats.try_get_or_refresh(&acc, "photos", true).await.unwrap();
        assert_eq!(lookup.source, StatSource::Provider);
        assert_eq!(lookup.stat.total_size_bytes, 150);
    }
    assert_eq!(h.provider.stats_calls(), 4);
}

#[tokio::test]
async fn test_inactive_account_never_listed() {
    let h = Harness::new();
    h.provider
        .add_bucket("ext-1", "a", 5, 100)
        .add_bucket("ext-1", "b", 10, 200)
        .add_bucket("ext-2", "c", 1, 50);

    let listing = h
        .aggregator
        .list_buckets(
            "u-1",
            &[account("acc-1", "ext-1", true), account("acc-2", "ext-2", false)],
            false,
        )
        .await
        .unwrap();

    assert_eq!(sorted_names(&listing.buckets), vec!["a", "b"]);
    let a = listing.buckets.iter().find(|b| b.name == "a").unwrap();
    assert_eq!((a.object_count, a.total_size_bytes), (5, 100));
    let b = listing.buckets.iter().find(|b| b.name == "b").unwrap();
    assert_eq!((b.object_count, b.total_size_bytes), (10, 200));
    assert_eq!(listing.total_size_bytes(), 300);
    assert_eq!(h.provider.stats_calls_for("ext-2", "c"), 0);
}

#[tokio::test]
async fn test_partial_failure_is_contained() {
    let h = Harness::new();
    h.provider
        .add_bucket("ext-1", "a", 1, 10)
        .add_bucket("ext-2", "b", 2, 20)
        .add_bucket("ext-3", "c", 3, 30)
        .fail_listing("ext-2", true);

    let accounts = [
        account("acc-1", "ext-1", true),
        account("acc-2", "ext-2", true),
        account("acc-3", "ext-3", true),
    ];
    let listing = h.aggregator.list_buckets("u-1", &accounts, false).await.unwrap();

    assert_eq!(sorted_names(&listing.buckets), vec!["a", "c"]);
    assert_eq!(listing.warnings.len(), 1);
    assert!(listing.warnings[0].contains("acc-2"));

    let cached = h.snapshots.read_cached("u-1").await.unwrap();
    assert_eq!(cached, listing);
}

#[tokio::test]
async fn test_total_failure_keeps_previous_snapshot() {
    let h = Harness::new();
    h.provider.add_bucket("ext-1", "a", 1, 10).add_bucket("ext-2", "b", 2, 20);
    let accounts = [account("acc-1", "ext-1", true), account("acc-2", "ext-2", true)];

    h.aggregator.list_buckets("u-1", &accounts, false).await.unwrap();
    let before = h.snapshots.read_cached("u-1").await.unwrap();
    let refreshed_before = h.snapshots.last_api_refresh("u-1").await;

    h.clock.advance(chrono::Duration::minutes(5));
    h.provider.fail_listing("ext-1", true).fail_listing("ext-2", true);

    let result = h.aggregator.list_buckets("u-1", &accounts, true).await;
    match result {
        Err(AggregateError::TotalFailure { errors }) => assert_eq!(errors.len(), 2),
        other => panic!("expected total failure, got {other:?}"),
    }

    assert_eq!(h.snapshots.read_cached("u-1").await, Some(before));
    assert_eq!(h.snapshots.last_api_refresh("u-1").await, refreshed_before);
}

#[tokio::test]
async fn test_idempotent_reaggregation() {
    let h = Harness::new();
    h.provider
        .add_bucket("ext-1", "a", 1, 10)
        .add_bucket("ext-1", "b", 2, 20)
        .add_bucket("ext-2", "c", 3, 30);
    let accounts = [account("acc-1", "ext-1", true), account("acc-2", "ext-2", true)];

    let first = h.aggregator.list_buckets("u-1", &accounts, false).await.unwrap();
    let second = h.aggregator.list_buckets("u-1", &accounts, false).await.unwrap();

    let mut first_buckets = first.buckets.clone();
    let mut second_buckets = second.buckets.clone();
    first_buckets.sort_by(|x, y| x.name.cmp(&y.name));
    second_buckets.sort_by(|x, y| x.name.cmp(&y.name));
    assert_eq!(first_buckets, second_buckets);

    for (ext, bucket) in [("ext-1", "a"), ("ext-1", "b"), ("ext-2", "c")] {
        assert_eq!(h.provider.stats_calls_for(ext, bucket), 1, "{ext}/{bucket}");
    }
    assert_eq!(h.metrics.snapshot().stats_cache_hits, 3);
}

#[tokio::test]
async fn test_scheduler_survives_failing_user() {
    let h = Harness::new();
    h.provider
        .add_bucket("ext-1", "a", 1, 10)
        .add_bucket("ext-2", "b", 2, 20)
        .add_bucket("ext-2", "c", 3, 30)
        .add_bucket("ext-3", "d", 4, 40)
        .fail_listing("ext-2", true);

    h.put_user("u-1", vec![account("acc-1", "ext-1", true)]).await;
    h.put_user("u-2", vec![account("acc-2", "ext-2", true)]).await;
    h.put_user("u-3", vec![account("acc-3", "ext-3", true)]).await;

    let summary = h.scheduler.run_global_refresh().await.unwrap();
    assert_eq!(summary.total_users, 3);
    assert_eq!(summary.total_accounts, 3);
    assert_eq!(summary.total_buckets, 2);
    assert_eq!(summary.refreshed_stats, 2);
    assert!(summary.error_count >= 1);

    let stored = h.scheduler.last_summary().await.unwrap();
    assert_eq!(stored, summary);
    assert_eq!(h.provider.stats_calls_for("ext-3", "d"), 1);
}

#[tokio::test]
async fn test_scheduler_summary_expires_after_a_day() {
    let h = Harness::new();
    h.scheduler.run_global_refresh().await.unwrap();
    assert!(h.scheduler.last_summary().await.is_some());

    h.clock.advance(chrono::Duration::hours(25));
    assert!(h.scheduler.last_summary().await.is_none());
}

#[tokio::test]
async fn test_scheduler_refresh_replaces_stale_stats() {
    let h = Harness::new();
    h.provider.add_bucket("ext-1", "a", 1, 10);
    let acc = account("acc-1", "ext-1", true);
    h.put_user("u-1", vec![acc.clone()]).await;

    h.stats.get_or_refresh(&acc, "a", false).await;
    h.provider.set_usage(
        "ext-1",
        "a",
        BucketUsage {
            object_count: 2,
            total_size_bytes: 99,
        },
    );

    h.scheduler.run_global_refresh().await.unwrap();
    let stat = h.stats.cached("ext-1", "a").await.unwrap();
    assert_eq!(stat.total_size_bytes, 99);
}

#[tokio::test]
async fn test_delete_account_cleans_every_bucket() {
    let h = Harness::new();
    let names = ["b1", "b2", "b3", "b4", "b5"];
    for (i, name) in names.iter().enumerate() {
        h.provider.add_bucket("ext-1", name, i as u64, 100 * i as u64);
    }
    let acc = account("acc-1", "ext-1", true);
    h.put_user("u-1", vec![acc.clone()]).await;

    for name in names {
        h.stats.get_or_refresh(&acc, name, false).await;
    }
    assert_eq!(h.provider.stats_calls(), 5);

    let deleted = h.accounts.delete_account("u-1", "acc-1").await.unwrap();
    assert_eq!(deleted, 5);
    assert!(h.store.list(&bucket_stats_prefix("ext-1")).await.unwrap().is_empty());

    for name in names {
        let lookup = h.stats.try_get_or_refresh(&acc, name, false).await.unwrap();
        assert_eq!(lookup.source, StatSource::Provider);
    }
    assert_eq!(h.provider.stats_calls(), 10);
}

#[tokio::test]
async fn test_expired_keys_are_purged() {
    let h = Harness::new();
    h.provider.add_bucket("ext-1", "a", 1, 10);
    h.aggregator
        .list_buckets("u-1", &[account("acc-1", "ext-1", true)], false)
        .await
        .unwrap();
    h.scheduler.run_global_refresh().await.unwrap();

    h.clock.advance(chrono::Duration::hours(2));
    let purged = h.store.purge_expired().await.unwrap();
    // bucket stat + user snapshot; the refresh summary and refresh marker remain
    assert_eq!(purged.expired, 2);
    assert!(h.snapshots.last_api_refresh("u-1").await.is_some());
    assert!(h.scheduler.last_summary().await.is_some());
}

/// Memory store whose reads and writes can be switched to fail
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool, key: &str) -> kv::Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(KvError::InvalidKey(format!("store unavailable: {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> kv::Result<Option<String>> {
        Self::check(&self.fail_reads, key)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> kv::Result<()> {
        Self::check(&self.fail_writes, key)?;
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> kv::Result<bool> {
        Self::check(&self.fail_writes, key)?;
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> kv::Result<Vec<String>> {
        Self::check(&self.fail_reads, prefix)?;
        self.inner.list(prefix).await
    }
}

struct FlakyHarness {
    store: Arc<FlakyStore>,
    provider: Arc<MockProvider>,
    stats: Arc<StatsCache>,
    snapshots: Arc<UserRefreshCache>,
    aggregator: BucketAggregator,
    scheduler: RefreshScheduler,
}

impl FlakyHarness {
    fn new() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(FlakyStore::default());
        let provider = Arc::new(MockProvider::new());
        let metrics = Arc::new(Metrics::new());

        let stats = Arc::new(StatsCache::new(
            store.clone(),
            provider.clone(),
            clock.clone(),
            HOUR,
            metrics.clone(),
        ));
        let snapshots = Arc::new(UserRefreshCache::new(store.clone(), HOUR, metrics.clone()));
        let aggregator = BucketAggregator::new(
            provider.clone(),
            stats.clone(),
            snapshots.clone(),
            clock.clone(),
            metrics.clone(),
        );
        let scheduler = RefreshScheduler::new(
            AccountStore::new(store.clone()),
            provider.clone(),
            stats.clone(),
            store.clone(),
            clock,
            DAY,
            metrics,
        );

        Self {
            store,
            provider,
            stats,
            snapshots,
            aggregator,
            scheduler,
        }
    }

    fn set_failing(&self, reads: bool, writes: bool) {
        self.store.fail_reads.store(reads, Ordering::SeqCst);
        self.store.fail_writes.store(writes, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_broken_store_still_serves_provider_stats() {
    let h = FlakyHarness::new();
    h.provider.add_bucket("ext-1", "a", 7, 700);
    let acc = account("acc-1", "ext-1", true);
    h.set_failing(true, true);

    let lookup = h.stats.try_get_or_refresh(&acc, "a", false).await.unwrap();
    assert_eq!(lookup.source, StatSource::Provider);
    assert_eq!(lookup.stat.object_count, 7);
    assert_eq!(lookup.stat.total_size_bytes, 700);

    let stat = h.stats.get_or_refresh(&acc, "a", false).await;
    assert_eq!(stat.total_size_bytes, 700);
    assert!(h.stats.cached("ext-1", "a").await.is_none());
    assert!(h.stats.invalidate("ext-1", "a").await.is_err());
}

#[tokio::test]
async fn test_broken_store_does_not_fail_aggregation() {
    let h = FlakyHarness::new();
    h.provider.add_bucket("ext-1", "a", 1, 10).add_bucket("ext-1", "b", 2, 20);
    h.set_failing(true, true);

    let listing = h
        .aggregator
        .list_buckets("u-1", &[account("acc-1", "ext-1", true)], false)
        .await
        .unwrap();
    assert_eq!(sorted_names(&listing.buckets), vec!["a", "b"]);
    assert_eq!(listing.total_size_bytes(), 30);
    assert!(listing.warnings.is_empty());

    // Nothing was persisted, and the unreadable snapshot reads as absent
    h.set_failing(false, false);
    assert!(h.snapshots.read_cached("u-1").await.is_none());
    assert!(h.snapshots.last_api_refresh("u-1").await.is_none());
    h.set_failing(true, false);
    assert!(h.snapshots.read_cached("u-1").await.is_none());
}

#[tokio::test]
async fn test_scheduler_completes_when_summary_write_fails() {
    let h = FlakyHarness::new();
    h.provider.add_bucket("ext-1", "a", 1, 10);
    let mut user = UserRecord::new("u-1", Utc::now());
    user.accounts = vec![account("acc-1", "ext-1", true)];
    AccountStore::new(h.store.clone()).put_user(&user).await.unwrap();

    h.set_failing(false, true);
    let summary = h.scheduler.run_global_refresh().await.unwrap();
    assert_eq!(summary.total_buckets, 1);
    assert_eq!(summary.refreshed_stats, 1);
    assert_eq!(summary.error_count, 0);
    assert!(h.scheduler.last_summary().await.is_none());

    h.set_failing(true, false);
    assert!(h.scheduler.run_global_refresh().await.is_err());
}
