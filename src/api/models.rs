//! Request and response bodies of the HTTP API
//!
//! All JSON is camelCase. Account credentials are accepted on create and
//! never serialized back out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::Account;
use crate::observability::MetricsSnapshot;
use crate::stats::{BucketSummary, RefreshSummary, RunState};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketsResponse {
    pub data: Vec<BucketSummary>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BucketsQuery {
    #[serde(default)]
    pub refresh: Option<String>,
}

impl BucketsQuery {
    /// `?refresh`, `?refresh=true` and `?refresh=1` all force a refresh
    pub fn force_refresh(&self) -> bool {
        matches!(
            self.refresh.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("" | "true" | "1" | "yes")
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRefreshResponse {
    pub last_api_refresh: Option<DateTime<Utc>>,
    pub last_cron_refresh: Option<DateTime<Utc>>,
    pub cron_summary: Option<RefreshSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub name: String,
    pub external_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            external_id: account.external_id,
            is_active: account.is_active,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountResponse {
    pub deleted_cache_entries: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub refresh: RunState,
    pub metrics: MetricsSnapshot,
}
