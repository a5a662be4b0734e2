use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "BUCKETWATCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/bucketwatch.toml";
const ENV_PREFIX: &str = "BUCKETWATCH";
const ENV_SEPARATOR: &str = "__";
const CRON_SECRET_VAR: &str = "BUCKETWATCH_CRON_SECRET";

/// Load configuration with priority (lowest first): struct defaults, TOML
/// file, `.env`, process environment
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// Secrets only ever come from the environment
fn load_secrets(config: &mut Config) {
    config.refresh.cron_secret = env::var(CRON_SECRET_VAR)
        .ok()
        .filter(|secret| !secret.is_empty());
}

pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // BUCKETWATCH__CACHE__BUCKET_STATS_TTL_SECS -> cache.bucket_stats_ttl_secs
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
