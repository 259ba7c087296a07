use backup_bus::{run_service, utils::logger, RequestHandler};
use backup_services::config::AppConfig;
use backup_services::coordinator::{BackupService, Coordinator, TransactionRegistry};
use backup_services::db::connection::create_pool;
use backup_services::db::migrate::migrate;
use backup_services::restore::{Resolver, RestoreService};
use backup_services::services::reaper::start_reaper;
use backup_services::storage::{BusCloudGateway, CloudGateway, CloudSource, LocalTier};
use backup_services::store::{MetadataStore, SqliteMetadataStore};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    logger::init(&config.log_level)?;

    tracing::info!(
        "Starting backup-services v{} (bus {})",
        env!("CARGO_PKG_VERSION"),
        config.bus.address()
    );

    // Ensure data directories exist
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(&config.primary_root)?;
    std::fs::create_dir_all(&config.secondary_root)?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    let pool = create_pool(&config.db_path)?;
    migrate(&pool)?;

    let store: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(pool));
    let cloud: Arc<dyn CloudGateway> =
        Arc::new(BusCloudGateway::new(config.bus.clone(), config.cloud_service.clone()));
    let primary = LocalTier::primary(&config.primary_root);
    let secondary = LocalTier::secondary(&config.secondary_root);

    let cancel = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut coordinator_handle = None;

    if config.is_enabled("backup") {
        let coordinator = Arc::new(Coordinator::new(
            Arc::new(TransactionRegistry::new()),
            primary.clone(),
            secondary.clone(),
            cloud.clone(),
            store.clone(),
        ));

        if let Some(ttl) = config.transaction_ttl {
            tracing::info!("Abandoned transactions are rolled back after {}s", ttl.as_secs());
            tasks.push(start_reaper(
                coordinator.clone(),
                ttl,
                config.reaper_interval,
                cancel.clone(),
            ));
        }

        tasks.push(spawn_service(
            &config,
            config.backup_service.clone(),
            Arc::new(BackupService::new(coordinator.clone())),
            cancel.clone(),
        ));
        coordinator_handle = Some(coordinator);
    }

    if config.is_enabled("restore") {
        let resolver = Arc::new(Resolver::new(
            store.clone(),
            vec![
                Arc::new(primary.clone()),
                Arc::new(secondary.clone()),
                Arc::new(CloudSource::new(cloud.clone())),
            ],
        ));
        tasks.push(spawn_service(
            &config,
            config.restore_service.clone(),
            Arc::new(RestoreService::new(resolver)),
            cancel.clone(),
        ));
    }

    if tasks.is_empty() {
        anyhow::bail!("No services enabled (ENABLED_SERVICES={:?})", config.enabled_services);
    }

    shutdown_signal(cancel.clone()).await;

    tracing::info!("Shutting down...");
    for task in tasks {
        if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), task).await {
            tracing::warn!("Task did not stop in time: {}", e);
        }
    }
    tracing::info!("Services stopped");

    // Open transactions die with the process; their copies must not outlive it
    if let Some(coordinator) = coordinator_handle {
        let rolled_back = coordinator.roll_back_pending().await;
        if rolled_back > 0 {
            tracing::warn!("Rolled back {} open transaction(s) on shutdown", rolled_back);
        }
    }

    Ok(())
}

fn spawn_service<H>(
    config: &AppConfig,
    name: String,
    handler: Arc<H>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    H: RequestHandler + 'static,
{
    let bus = config.bus.clone();
    let policy = config.restart.clone();
    tokio::spawn(async move {
        if let Err(e) = run_service(bus, name.clone(), handler, policy, cancel.clone()).await {
            tracing::error!("Service '{}' stopped: {}", name, e);
            // A service that gave up takes the whole process down
            cancel.cancel();
        }
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = cancel.cancelled() => tracing::warn!("A service stopped; shutting down"),
    }

    cancel.cancel();
}
