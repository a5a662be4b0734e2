use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::provider::ProviderClient;
use crate::stats::{StatsCache, UserRefreshCache};

use super::error::{AccountError, Result};
use super::models::{Account, NewAccount, UserRecord};
use super::store::AccountStore;

const MAX_NAME_LEN: usize = 128;

/// Account lifecycle operations for a single user at a time
pub struct AccountService {
    accounts: AccountStore,
    provider: Arc<dyn ProviderClient>,
    stats: Arc<StatsCache>,
    snapshots: Arc<UserRefreshCache>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(
        accounts: AccountStore,
        provider: Arc<dyn ProviderClient>,
        stats: Arc<StatsCache>,
        snapshots: Arc<UserRefreshCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            provider,
            stats,
            snapshots,
            clock,
        }
    }

    /// All accounts of the user; an unknown user simply has none
    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        Ok(self
            .accounts
            .get_user(user_id)
            .await?
            .map(|user| user.accounts)
            .unwrap_or_default())
    }

    /// Accounts of a user that must already exist
    ///
    /// Bucket reads use this so an unknown id fails before anything is
    /// aggregated or written on its behalf.
    pub async fn existing_user_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        self.accounts
            .get_user(user_id)
            .await?
            .map(|user| user.accounts)
            .ok_or_else(|| AccountError::UserNotFound(user_id.to_string()))
    }

    pub async fn add_account(&self, user_id: &str, input: NewAccount) -> Result<Account> {
        let name = validate_name(&input.name)?;
        let external_id = input.external_id.trim();
        if external_id.is_empty() {
            return Err(AccountError::Invalid("externalId must not be empty".into()));
        }
        if external_id.contains(':') {
            return Err(AccountError::Invalid("externalId must not contain ':'".into()));
        }
        if input.credential.trim().is_empty() {
            return Err(AccountError::Invalid("credential must not be empty".into()));
        }

        let now = self.clock.now();
        let mut user = self
            .accounts
            .get_user(user_id)
            .await?
            .unwrap_or_else(|| UserRecord::new(user_id, now));

        if user.accounts.iter().any(|a| a.external_id == external_id) {
            return Err(AccountError::Invalid(format!(
                "account {external_id} is already registered"
            )));
        }

        let account = Account {
            id: Uuid::now_v7().to_string(),
            name,
            external_id: external_id.to_string(),
            credential: input.credential,
            is_active: true,
            created_at: now,
        };
        user.accounts.push(account.clone());
        self.accounts.put_user(&user).await?;

        info!(user_id, account_id = %account.id, "Account added");
        Ok(account)
    }

    pub async fn rename_account(&self, user_id: &str, account_id: &str, name: &str) -> Result<Account> {
        let name = validate_name(name)?;
        self.update_account(user_id, account_id, |account| account.name = name)
            .await
    }

    pub async fn set_active(&self, user_id: &str, account_id: &str, active: bool) -> Result<Account> {
        let account = self
            .update_account(user_id, account_id, |account| account.is_active = active)
            .await?;
        // The snapshot would otherwise keep showing (or hiding) this account's buckets
        self.snapshots.invalidate(user_id).await;
        Ok(account)
    }

    /// Remove an account and purge its bucket stats from the cache
    ///
    /// Cache cleanup is best-effort: if the provider cannot list the buckets
    /// the account is still removed and leftover entries age out on their
    /// own. Returns how many cache entries were deleted.
    pub async fn delete_account(&self, user_id: &str, account_id: &str) -> Result<usize> {
        let mut user = self
            .accounts
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccountError::UserNotFound(user_id.to_string()))?;
        let account = user
            .account(account_id)
            .cloned()
            .ok_or_else(|| AccountError::AccountNotFound(account_id.to_string()))?;

        let deleted = if account.is_queryable() {
            self.purge_bucket_stats(&account).await
        } else {
            0
        };

        user.accounts.retain(|a| a.id != account_id);
        self.accounts.put_user(&user).await?;
        self.snapshots.invalidate(user_id).await;

        info!(user_id, account_id, deleted_cache_entries = deleted, "Account deleted");
        Ok(deleted)
    }

    async fn purge_bucket_stats(&self, account: &Account) -> usize {
        let buckets = match self
            .provider
            .list_buckets(&account.external_id, &account.credential)
            .await
        {
            Ok(buckets) => buckets,
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "Could not list buckets for cache cleanup");
                return 0;
            }
        };

        let mut deleted = 0;
        for bucket in &buckets {
            match self.stats.invalidate(&account.external_id, &bucket.name).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!(account_id = %account.id, bucket = %bucket.name, error = %e, "Cache cleanup failed"),
            }
        }
        deleted
    }

    async fn update_account<F>(&self, user_id: &str, account_id: &str, apply: F) -> Result<Account>
    where
        F: FnOnce(&mut Account),
    {
        let mut user = self
            .accounts
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccountError::UserNotFound(user_id.to_string()))?;
        let account = user
            .account_mut(account_id)
            .ok_or_else(|| AccountError::AccountNotFound(account_id.to_string()))?;

        apply(account);
        let updated = account.clone();
        self.accounts.put_user(&user).await?;
        Ok(updated)
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AccountError::Invalid("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AccountError::Invalid(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}
