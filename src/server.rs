use std::sync::Arc;

use tracing::{info, warn};

use bucketwatch::accounts::{Account, AccountStore, UserRecord};
use bucketwatch::api::{self, AppState};
use bucketwatch::clock::{Clock, SystemClock};
use bucketwatch::config::Config;
use bucketwatch::kv::{FjallStore, KeyValueStore, MemoryStore};
use bucketwatch::provider::{HttpProviderClient, HttpProviderConfig, MockProvider, ProviderClient};
use bucketwatch::stats::{RefreshJob, RefreshJobConfig};

use crate::cli::{ServerArgs, StoreArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

const DEMO_USER: &str = "demo";

/// Store and provider picked from the command line
struct Runtime {
    state: AppState,
    fjall: Option<FjallStore>,
}

async fn bootstrap(config: Config, args: &StoreArgs) -> Result<Runtime, AnyError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (store, fjall): (Arc<dyn KeyValueStore>, Option<FjallStore>) = if args.in_memory {
        info!("Using in-memory store");
        (Arc::new(MemoryStore::new(clock.clone())), None)
    } else {
        info!(path = %config.server.data_path.display(), "Opening fjall keyspace");
        let fjall = FjallStore::open(&config.server.data_path, clock.clone())
            .map_err(|e| format!("Failed to open store: {e}"))?;
        (Arc::new(fjall.clone()), Some(fjall))
    };

    let provider: Arc<dyn ProviderClient> = if args.demo {
        seed_demo_user(store.clone(), clock.as_ref()).await?;
        Arc::new(demo_provider())
    } else {
        let provider_config = HttpProviderConfig::from(&config.provider);
        info!(api_url = %provider_config.api_url, "Using HTTP provider");
        Arc::new(HttpProviderClient::new(provider_config)?)
    };

    Ok(Runtime {
        state: AppState::new(config, store, provider, clock),
        fjall,
    })
}

pub async fn run(args: ServerArgs) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let address = args.address.unwrap_or(config.server.bind_addr);

    if config.refresh.cron_secret.is_none() {
        warn!("BUCKETWATCH_CRON_SECRET is not set, POST /refresh will reject every call");
    }

    let job_config = RefreshJobConfig {
        interval: config.refresh.interval(),
        enabled: config.refresh.enabled,
    };
    let runtime = bootstrap(config, &args.store).await?;

    let job_shutdown = RefreshJob::new(
        runtime.state.scheduler.clone(),
        runtime.state.store.clone(),
        job_config,
    )
    .start();

    api::run(address, runtime.state, shutdown_signal()).await?;

    let _ = job_shutdown.send(true);
    if let Some(fjall) = runtime.fjall {
        fjall.persist()?;
        info!("Keyspace flushed");
    }
    Ok(())
}

pub async fn refresh_once(args: StoreArgs) -> Result<(), AnyError> {
    let config = Config::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let runtime = bootstrap(config, &args).await?;

    let summary = runtime.state.scheduler.run_global_refresh().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(fjall) = runtime.fjall {
        fjall.persist()?;
    }
    Ok(())
}

fn demo_provider() -> MockProvider {
    let provider = MockProvider::new();
    provider
        .add_bucket("demo-main", "photos", 12_408, 48_318_550_016)
        .add_bucket("demo-main", "backups", 311, 912_680_550_400)
        .add_bucket("demo-main", "site-assets", 2_950, 734_003_200)
        .add_bucket("demo-archive", "cold-storage", 88_120, 2_199_023_255_552)
        .add_bucket("demo-legacy", "old-exports", 40, 10_485_760);
    provider
}

async fn seed_demo_user(store: Arc<dyn KeyValueStore>, clock: &dyn Clock) -> Result<(), AnyError> {
    let accounts = AccountStore::new(store);
    if accounts.get_user(DEMO_USER).await?.is_some() {
        return Ok(());
    }

    let now = clock.now();
    let account = |id: &str, name: &str, active: bool| Account {
        id: format!("acct-{id}"),
        name: name.to_string(),
        external_id: format!("demo-{id}"),
        credential: "demo-token".to_string(),
        is_active: active,
        created_at: now,
    };

    let mut user = UserRecord::new(DEMO_USER, now);
    user.accounts = vec![
        account("main", "Main", true),
        account("archive", "Archive", true),
        account("legacy", "Legacy", false),
    ];
    accounts.put_user(&user).await?;
    info!(user_id = DEMO_USER, accounts = user.accounts.len(), "Seeded demo user");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
