//! Periodic driver for the global refresh

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::kv::KeyValueStore;

use super::scheduler::RefreshScheduler;

#[derive(Debug, Clone)]
pub struct RefreshJobConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for RefreshJobConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            enabled: true,
        }
    }
}

/// Runs [`RefreshScheduler::run_global_refresh`] on a fixed interval and
/// sweeps expired keys from the store after each run
pub struct RefreshJob {
    scheduler: Arc<RefreshScheduler>,
    store: Arc<dyn KeyValueStore>,
    config: RefreshJobConfig,
}

impl RefreshJob {
    pub fn new(scheduler: Arc<RefreshScheduler>, store: Arc<dyn KeyValueStore>, config: RefreshJobConfig) -> Self {
        Self {
            scheduler,
            store,
            config,
        }
    }

    /// Start the job; send `true` on the returned channel to stop it
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        if !self.config.enabled {
            info!("Scheduled refresh is disabled");
            return shutdown_tx;
        }

        let interval = self.config.interval;
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Starting scheduled refresh job");

            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = timer.tick() => self.run_once().await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Scheduled refresh job shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    async fn run_once(&self) {
        if let Err(e) = self.scheduler.run_global_refresh().await {
            error!(error = %e, "Scheduled refresh failed");
        }
        if let Err(e) = self.store.purge_expired().await {
            error!(error = %e, "Expired key sweep failed");
        }
    }
}
