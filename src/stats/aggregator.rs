use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::accounts::Account;
use crate::clock::Clock;
use crate::humanize::ByteSize;
use crate::observability::Metrics;
use crate::provider::ProviderClient;

use super::cache::StatsCache;
use super::snapshot::{AggregatedBucketList, BucketSummary, UserRefreshCache};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no account could be queried ({} failed)", errors.len())]
    TotalFailure { errors: Vec<String> },
}

/// Builds one bucket listing across all of a user's accounts
///
/// Each account is an independent unit of work: a failed listing becomes a
/// warning and the remaining accounts are still queried. Stats for the
/// buckets of one account are looked up concurrently.
pub struct BucketAggregator {
    provider: Arc<dyn ProviderClient>,
    stats: Arc<StatsCache>,
    snapshots: Arc<UserRefreshCache>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl BucketAggregator {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        stats: Arc<StatsCache>,
        snapshots: Arc<UserRefreshCache>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            provider,
            stats,
            snapshots,
            clock,
            metrics,
        }
    }

    /// Aggregate buckets of every active account in `accounts`
    ///
    /// Succeeds when at least one account was listed (or there was nothing to
    /// list) and then replaces the user's snapshot. When every queried account
    /// failed, nothing is written and the previous snapshot stays servable.
    pub async fn list_buckets(
        &self,
        user_id: &str,
        accounts: &[Account],
        force_refresh: bool,
    ) -> Result<AggregatedBucketList, AggregateError> {
        let mut buckets = Vec::new();
        let mut warnings = Vec::new();
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for account in accounts.iter().filter(|a| a.is_active) {
            if !account.is_queryable() {
                failed += 1;
                warnings.push(format!("Account {} ({}): no credential configured", account.name, account.id));
                continue;
            }

            let listed = match self
                .provider
                .list_buckets(&account.external_id, &account.credential)
                .await
            {
                Ok(listed) => listed,
                Err(e) => {
                    self.metrics.provider_failure();
                    warn!(user_id, account_id = %account.id, error = %e, "Bucket listing failed");
                    failed += 1;
                    warnings.push(format!("Account {} ({}): {}", account.name, account.id, e));
                    continue;
                }
            };
            succeeded += 1;

            let lookups = listed
                .iter()
                .map(|bucket| self.stats.get_or_refresh(account, &bucket.name, force_refresh));
            let stats = join_all(lookups).await;

            buckets.extend(listed.into_iter().zip(stats).map(|(bucket, stat)| BucketSummary {
                name: bucket.name,
                account_id: account.id.clone(),
                account_name: account.name.clone(),
                object_count: stat.object_count,
                total_size_bytes: stat.total_size_bytes,
                created_at: bucket.created_at,
            }));
        }

        if succeeded == 0 && failed > 0 {
            warn!(user_id, failed, "Every account failed, keeping previous snapshot");
            return Err(AggregateError::TotalFailure { errors: warnings });
        }

        let listing = AggregatedBucketList {
            buckets,
            captured_at: self.clock.now(),
            warnings,
        };

        self.snapshots.store(user_id, &listing).await;
        self.snapshots.record_api_refresh(user_id, listing.captured_at).await;

        info!(
            user_id,
            accounts_ok = succeeded,
            accounts_failed = failed,
            buckets = listing.buckets.len(),
            total = %ByteSize(listing.total_size_bytes()),
            "Aggregated bucket listing"
        );
        Ok(listing)
    }
}
