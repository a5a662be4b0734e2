//! Layered configuration for bucketwatch
//!
//! Settings come from, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! ```no_run
//! use bucketwatch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! Environment overrides follow `BUCKETWATCH__<section>__<key>`, e.g.
//! `BUCKETWATCH__REFRESH__INTERVAL_SECS=300`. The manual refresh secret is
//! read only from `BUCKETWATCH_CRON_SECRET`.
//!
//! The file defaults to `config/bucketwatch.toml`; set `BUCKETWATCH_CONFIG`
//! to point elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{CacheConfig, Config, ProviderConfig, RefreshConfig, ServerConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from file and environment, then validate it
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load from a specific file, ignoring `BUCKETWATCH_CONFIG`
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
