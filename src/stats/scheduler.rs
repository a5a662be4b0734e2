use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::accounts::{AccountError, AccountStore};
use crate::clock::Clock;
use crate::kv::keys::LAST_CRON_REFRESH_KEY;
use crate::kv::{self, KeyValueStore, VersionedRecord};
use crate::observability::Metrics;
use crate::provider::ProviderClient;

use super::cache::StatsCache;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to enumerate users: {0}")]
    UserListing(#[source] AccountError),
}

/// Outcome of one global refresh run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub total_users: u64,
    pub total_accounts: u64,
    pub total_buckets: u64,
    pub refreshed_stats: u64,
    pub error_count: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl VersionedRecord for RefreshSummary {
    const KIND: &'static str = "refresh-summary";
    const SCHEMA_VERSION: u32 = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Default)]
struct Counters {
    users: u64,
    accounts: u64,
    buckets: u64,
    refreshed: u64,
    errors: u64,
}

/// Walks every user, account and bucket and force-refreshes its stats
///
/// A run is strictly sequential and cannot be cancelled. Failures of one
/// user, account or bucket bump the error counter and the walk moves on.
/// The summary is written once, at the very end.
pub struct RefreshScheduler {
    accounts: AccountStore,
    provider: Arc<dyn ProviderClient>,
    stats: Arc<StatsCache>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    summary_ttl: Duration,
    metrics: Arc<Metrics>,
    state: Mutex<RunState>,
}

impl RefreshScheduler {
    pub fn new(
        accounts: AccountStore,
        provider: Arc<dyn ProviderClient>,
        stats: Arc<StatsCache>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        summary_ttl: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            accounts,
            provider,
            stats,
            store,
            clock,
            summary_ttl,
            metrics,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    pub async fn run_global_refresh(&self) -> Result<RefreshSummary, RefreshError> {
        self.set_state(RunState::Running);
        let started = Instant::now();
        info!("Global refresh started");

        let user_ids = match self.accounts.list_user_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                self.set_state(RunState::Failed);
                warn!(error = %e, "Global refresh aborted");
                return Err(RefreshError::UserListing(e));
            }
        };

        let mut counters = Counters::default();
        for user_id in &user_ids {
            counters.users += 1;
            self.refresh_user(user_id, &mut counters).await;
        }

        let summary = RefreshSummary {
            total_users: counters.users,
            total_accounts: counters.accounts,
            total_buckets: counters.buckets,
            refreshed_stats: counters.refreshed,
            error_count: counters.errors,
            timestamp: self.clock.now(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        if let Err(e) =
            kv::save_record(self.store.as_ref(), LAST_CRON_REFRESH_KEY, &summary, Some(self.summary_ttl)).await
        {
            warn!(error = %e, "Failed to persist refresh summary");
        }

        self.metrics.refresh_completed(summary.error_count);
        self.set_state(RunState::Completed);
        info!(
            users = summary.total_users,
            accounts = summary.total_accounts,
            buckets = summary.total_buckets,
            refreshed = summary.refreshed_stats,
            errors = summary.error_count,
            duration_ms = summary.duration_ms,
            "Global refresh completed"
        );
        Ok(summary)
    }

    async fn refresh_user(&self, user_id: &str, counters: &mut Counters) {
        let user = match self.accounts.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load user, skipping");
                counters.errors += 1;
                return;
            }
        };

        for account in user.active_accounts() {
            counters.accounts += 1;

            if !account.is_queryable() {
                warn!(user_id, account_id = %account.id, "Active account has no credential");
                counters.errors += 1;
                continue;
            }

            let buckets = match self
                .provider
                .list_buckets(&account.external_id, &account.credential)
                .await
            {
                Ok(buckets) => buckets,
                Err(e) => {
                    self.metrics.provider_failure();
                    warn!(user_id, account_id = %account.id, error = %e, "Bucket listing failed");
                    counters.errors += 1;
                    continue;
                }
            };

            for bucket in buckets {
                counters.buckets += 1;
                match self.stats.try_get_or_refresh(account, &bucket.name, true).await {
                    Ok(_) => counters.refreshed += 1,
                    Err(e) => {
                        warn!(
                            user_id,
                            account_id = %account.id,
                            bucket = %bucket.name,
                            error = %e,
                            "Bucket stats refresh failed"
                        );
                        counters.errors += 1;
                    }
                }
            }
        }
    }

    /// Summary of the most recent completed run, if it has not expired
    pub async fn last_summary(&self) -> Option<RefreshSummary> {
        match kv::load_record(self.store.as_ref(), LAST_CRON_REFRESH_KEY).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Failed to read refresh summary");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{Account, UserRecord};
    use crate::clock::SystemClock;
    use crate::kv::MemoryStore;
    use crate::provider::MockProvider;

    async fn scheduler_with(provider: Arc<MockProvider>, users: Vec<UserRecord>) -> RefreshScheduler {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let metrics = Arc::new(Metrics::new());
        let accounts = AccountStore::new(store.clone());
        for user in &users {
            accounts.put_user(user).await.unwrap();
        }

        let stats = Arc::new(StatsCache::new(
            store.clone(),
            provider.clone(),
            clock.clone(),
            Duration::from_secs(3600),
            metrics.clone(),
        ));
        RefreshScheduler::new(
            accounts,
            provider,
            stats,
            store,
            clock,
            Duration::from_secs(86400),
            metrics,
        )
    }

    fn user(id: &str, accounts: Vec<Account>) -> UserRecord {
        let mut record = UserRecord::new(id, Utc::now());
        record.accounts = accounts;
        record
    }

    fn account(id: &str, active: bool) -> Account {
        Account {
            id: id.into(),
            name: id.into(),
            external_id: format!("ext-{id}"),
            credential: "token".into(),
            is_active: active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_empty_store_produces_zero_summary() {
        let scheduler = scheduler_with(Arc::new(MockProvider::new()), vec![]).await;
        assert_eq!(scheduler.state(), RunState::Idle);

        let summary = scheduler.run_global_refresh().await.unwrap();
        assert_eq!(summary.total_users, 0);
        assert_eq!(summary.error_count, 0);
        assert_eq!(scheduler.state(), RunState::Completed);
        assert_eq!(scheduler.last_summary().await, Some(summary));
    }

    #[tokio::test]
    async fn test_counts_and_inactive_accounts() {
        let provider = Arc::new(MockProvider::new());
        provider
            .add_bucket("ext-a", "a1", 1, 10)
            .add_bucket("ext-a", "a2", 2, 20)
            .add_bucket("ext-b", "b1", 3, 30)
            .fail_stats("ext-a", "a2");

        let scheduler = scheduler_with(
            provider.clone(),
            vec![user("u-1", vec![account("a", true), account("b", false)])],
        )
        .await;

        let summary = scheduler.run_global_refresh().await.unwrap();
        assert_eq!(summary.total_users, 1);
        assert_eq!(summary.total_accounts, 1);
        assert_eq!(summary.total_buckets, 2);
        assert_eq!(summary.refreshed_stats, 1);
        assert_eq!(summary.error_count, 1);
        assert_eq!(provider.stats_calls_for("ext-b", "b1"), 0);
    }

    #[tokio::test]
    async fn test_second_run_forces_provider_calls() {
        let provider = Arc::new(MockProvider::new());
        provider.add_bucket("ext-a", "a1", 1, 10);
        let scheduler = scheduler_with(provider.clone(), vec![user("u-1", vec![account("a", true)])]).await;

        scheduler.run_global_refresh().await.unwrap();
        scheduler.run_global_refresh().await.unwrap();
        assert_eq!(provider.stats_calls_for("ext-a", "a1"), 2);
    }
}
