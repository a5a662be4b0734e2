use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory of the fjall keyspace
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_path: default_data_path(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/bucketwatch")
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024)
}

/// Storage provider API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on file-listing pages read per bucket when computing stats
    #[serde(default = "default_max_listing_pages")]
    pub max_listing_pages: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            max_listing_pages: default_max_listing_pages(),
            page_size: default_page_size(),
        }
    }
}

impl From<&ProviderConfig> for crate::provider::HttpProviderConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            user_agent: config.user_agent.clone(),
            max_listing_pages: config.max_listing_pages,
            page_size: config.page_size,
        }
    }
}

fn default_api_url() -> String {
    "https://api.backblazeb2.com".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("bucketwatch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_listing_pages() -> u32 {
    20
}

fn default_page_size() -> u32 {
    1000
}

/// Cache lifetimes, in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_hour")]
    pub bucket_stats_ttl_secs: u64,
    #[serde(default = "default_hour")]
    pub user_buckets_ttl_secs: u64,
    #[serde(default = "default_day")]
    pub refresh_summary_ttl_secs: u64,
}

impl CacheConfig {
    pub fn bucket_stats_ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_stats_ttl_secs)
    }

    pub fn user_buckets_ttl(&self) -> Duration {
        Duration::from_secs(self.user_buckets_ttl_secs)
    }

    pub fn refresh_summary_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_summary_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bucket_stats_ttl_secs: default_hour(),
            user_buckets_ttl_secs: default_hour(),
            refresh_summary_ttl_secs: default_day(),
        }
    }
}

fn default_hour() -> u64 {
    60 * 60
}

fn default_day() -> u64 {
    24 * 60 * 60
}

/// Scheduled and manual global refresh
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Shared secret for `POST /refresh` (loaded from environment, not from config file)
    #[serde(skip)]
    pub cron_secret: Option<String>,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            cron_secret: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    10 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.max_payload_bytes.as_u64(), 64 * 1024);
        assert_eq!(config.cache.bucket_stats_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.refresh_summary_ttl(), Duration::from_secs(86400));
        assert_eq!(config.refresh.interval(), Duration::from_secs(600));
        assert!(config.refresh.cron_secret.is_none());
        assert!(config.provider.user_agent.starts_with("bucketwatch/"));
    }
}
