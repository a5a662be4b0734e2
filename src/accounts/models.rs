use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kv::VersionedRecord;

/// Reference to one external storage account owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    /// Account identifier at the provider; bucket stats are keyed by it
    pub external_id: String,
    pub credential: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the provider can be asked anything on behalf of this account
    pub fn is_queryable(&self) -> bool {
        self.is_active && !self.credential.trim().is_empty()
    }
}

/// Everything a user owns, stored under `user:{user_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            accounts: Vec::new(),
            created_at,
        }
    }

    pub fn account(&self, account_id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == account_id)
    }

    pub fn account_mut(&mut self, account_id: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.id == account_id)
    }

    pub fn active_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|a| a.is_active)
    }
}

impl VersionedRecord for UserRecord {
    const KIND: &'static str = "user";
    const SCHEMA_VERSION: u32 = 1;
}

/// Input for registering a new account
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub name: String,
    pub external_id: String,
    pub credential: String,
}
