//! Key layout for the shared key-value store
//!
//! - `bucket-stats:{accountId}:{bucketName}` -> BucketStat
//! - `user-buckets:{userId}` -> AggregatedBucketList
//! - `last-api-refresh:{userId}` -> RefreshMarker
//! - `last-cron-refresh` -> RefreshSummary (singleton)
//! - `user:{userId}` -> UserRecord

pub const BUCKET_STATS_PREFIX: &str = "bucket-stats:";
pub const USER_BUCKETS_PREFIX: &str = "user-buckets:";
pub const LAST_API_REFRESH_PREFIX: &str = "last-api-refresh:";
pub const LAST_CRON_REFRESH_KEY: &str = "last-cron-refresh";
pub const USER_PREFIX: &str = "user:";

/// Encode a bucket stats key: bucket-stats:{account_id}:{bucket_name}
pub fn bucket_stats_key(account_id: &str, bucket_name: &str) -> String {
    format!("{BUCKET_STATS_PREFIX}{account_id}:{bucket_name}")
}

/// Prefix covering every bucket stat of one account
pub fn bucket_stats_prefix(account_id: &str) -> String {
    format!("{BUCKET_STATS_PREFIX}{account_id}:")
}

pub fn user_buckets_key(user_id: &str) -> String {
    format!("{USER_BUCKETS_PREFIX}{user_id}")
}

pub fn last_api_refresh_key(user_id: &str) -> String {
    format!("{LAST_API_REFRESH_PREFIX}{user_id}")
}

/// Encode a user record key: user:{user_id}
pub fn user_key(user_id: &str) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Decode a user record key: user:{user_id} -> user_id
pub fn decode_user_key(key: &str) -> Option<&str> {
    key.strip_prefix(USER_PREFIX).filter(|id| !id.is_empty())
}
