//! External storage provider client
//!
//! The provider owns the truth about an account's buckets. bucketwatch only
//! ever asks two questions of it:
//!
//! - which buckets does this account have ([`ProviderClient::list_buckets`])
//! - how many objects and bytes does one bucket hold ([`ProviderClient::bucket_stats`])
//!
//! Both calls are remote, rate-limited and fallible. Callers decide how to
//! contain a failure; this module only classifies it.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::{HttpProviderClient, HttpProviderConfig};
pub use mock::MockProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("provider rate limit hit: {0}")]
    RateLimited(String),

    #[error("provider error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("provider request timed out")]
    Timeout,

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Bucket as reported by the provider's listing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl BucketInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            created_at: None,
        }
    }
}

/// Object statistics for a single bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketUsage {
    pub object_count: u64,
    pub total_size_bytes: u64,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn list_buckets(&self, account_id: &str, credential: &str) -> Result<Vec<BucketInfo>>;

    async fn bucket_stats(
        &self,
        account_id: &str,
        credential: &str,
        bucket_name: &str,
    ) -> Result<BucketUsage>;
}
