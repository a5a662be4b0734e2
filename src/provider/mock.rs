//! Scripted in-process provider
//!
//! Used by the test suites and by `server --demo`. Accounts, buckets and
//! failures are configured up front; every call is counted so callers can
//! assert on cache behaviour.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{BucketInfo, BucketUsage, ProviderClient, ProviderError, Result};

#[derive(Debug, Default)]
struct MockAccount {
    buckets: Vec<(BucketInfo, BucketUsage)>,
    fail_listing: bool,
    failing_stats: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MockProvider {
    accounts: Mutex<HashMap<String, MockAccount>>,
    list_calls: AtomicUsize,
    stats_calls: AtomicUsize,
    stats_calls_by_bucket: Mutex<HashMap<(String, String), usize>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with no buckets
    pub fn add_account(&self, account_id: &str) -> &Self {
        self.with_accounts(|accounts| {
            accounts.entry(account_id.to_string()).or_default();
        });
        self
    }

    pub fn add_bucket(&self, account_id: &str, bucket_name: &str, object_count: u64, total_size_bytes: u64) -> &Self {
        self.with_accounts(|accounts| {
            let account = accounts.entry(account_id.to_string()).or_default();
            account.buckets.retain(|(bucket, _)| bucket.name != bucket_name);
            account.buckets.push((
                BucketInfo::named(bucket_name),
                BucketUsage {
                    object_count,
                    total_size_bytes,
                },
            ));
        });
        self
    }

    /// Change what the next stats call for a bucket reports
    pub fn set_usage(&self, account_id: &str, bucket_name: &str, usage: BucketUsage) {
        self.with_accounts(|accounts| {
            if let Some(account) = accounts.get_mut(account_id) {
                for (bucket, current) in &mut account.buckets {
                    if bucket.name == bucket_name {
                        *current = usage;
                    }
                }
            }
        });
    }

    pub fn fail_listing(&self, account_id: &str, fail: bool) -> &Self {
        self.with_accounts(|accounts| {
            accounts.entry(account_id.to_string()).or_default().fail_listing = fail;
        });
        self
    }

    pub fn fail_stats(&self, account_id: &str, bucket_name: &str) -> &Self {
        self.with_accounts(|accounts| {
            accounts
                .entry(account_id.to_string())
                .or_default()
                .failing_stats
                .insert(bucket_name.to_string());
        });
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::Relaxed)
    }

    pub fn stats_calls_for(&self, account_id: &str, bucket_name: &str) -> usize {
        self.stats_calls_by_bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(account_id.to_string(), bucket_name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn with_accounts<R>(&self, f: impl FnOnce(&mut HashMap<String, MockAccount>) -> R) -> R {
        let mut accounts = self
            .accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut accounts)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn list_buckets(&self, account_id: &str, _credential: &str) -> Result<Vec<BucketInfo>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(account_id, "Mock list_buckets");

        self.with_accounts(|accounts| match accounts.get(account_id) {
            None => Err(ProviderError::Unauthorized(format!("unknown account {account_id}"))),
            Some(account) if account.fail_listing => Err(ProviderError::Transport(format!(
                "listing failed for {account_id}"
            ))),
            Some(account) => Ok(account.buckets.iter().map(|(b, _)| b.clone()).collect()),
        })
    }

    async fn bucket_stats(
        &self,
        account_id: &str,
        _credential: &str,
        bucket_name: &str,
    ) -> Result<BucketUsage> {
        self.stats_calls.fetch_add(1, Ordering::Relaxed);
        *self
            .stats_calls_by_bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry((account_id.to_string(), bucket_name.to_string()))
            .or_default() += 1;

        self.with_accounts(|accounts| {
            let account = accounts
                .get(account_id)
                .ok_or_else(|| ProviderError::Unauthorized(format!("unknown account {account_id}")))?;

            if account.failing_stats.contains(bucket_name) {
                return Err(ProviderError::RateLimited(format!("stats for {bucket_name}")));
            }

            account
                .buckets
                .iter()
                .find(|(bucket, _)| bucket.name == bucket_name)
                .map(|(_, usage)| *usage)
                .ok_or_else(|| ProviderError::BucketNotFound(bucket_name.to_string()))
        })
    }
}
