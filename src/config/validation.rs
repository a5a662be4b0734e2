use super::models::Config;
use thiserror::Error;

const MAX_PAGE_SIZE: u32 = 10_000;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("TTL must be positive: {field}")]
    ZeroTtl { field: &'static str },

    #[error("Refresh interval must be positive")]
    ZeroRefreshInterval,

    #[error("Provider api_url must start with http:// or https://, got '{0}'")]
    InvalidApiUrl(String),

    #[error("Provider page_size must be within 1..=10000, got {0}")]
    InvalidPageSize(u32),

    #[error("Provider max_listing_pages must be positive")]
    ZeroListingPages,

    #[error("max_payload_bytes must be positive")]
    ZeroPayloadLimit,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_cache(config)?;
    validate_provider(config)?;
    validate_refresh(config)?;

    if config.server.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroPayloadLimit);
    }
    Ok(())
}

fn validate_cache(config: &Config) -> Result<(), ValidationError> {
    let ttls = [
        ("cache.bucket_stats_ttl_secs", config.cache.bucket_stats_ttl_secs),
        ("cache.user_buckets_ttl_secs", config.cache.user_buckets_ttl_secs),
        ("cache.refresh_summary_ttl_secs", config.cache.refresh_summary_ttl_secs),
    ];
    match ttls.iter().find(|(_, secs)| *secs == 0) {
        Some((field, _)) => Err(ValidationError::ZeroTtl { field: *field }),
        None => Ok(()),
    }
}

fn validate_provider(config: &Config) -> Result<(), ValidationError> {
    let provider = &config.provider;
    if !(provider.api_url.starts_with("http://") || provider.api_url.starts_with("https://")) {
        return Err(ValidationError::InvalidApiUrl(provider.api_url.clone()));
    }
    if provider.page_size == 0 || provider.page_size > MAX_PAGE_SIZE {
        return Err(ValidationError::InvalidPageSize(provider.page_size));
    }
    if provider.max_listing_pages == 0 {
        return Err(ValidationError::ZeroListingPages);
    }
    Ok(())
}

fn validate_refresh(config: &Config) -> Result<(), ValidationError> {
    if config.refresh.enabled && config.refresh.interval_secs == 0 {
        return Err(ValidationError::ZeroRefreshInterval);
    }
    Ok(())
}
