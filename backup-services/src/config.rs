use backup_bus::{BusConfig, RestartPolicy};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bus: BusConfig,
    pub backup_service: String,
    pub restore_service: String,
    pub cloud_service: String,
    pub enabled_services: Vec<String>,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub primary_root: PathBuf,
    pub secondary_root: PathBuf,
    /// None disables the abandoned-transaction reaper
    pub transaction_ttl: Option<Duration>,
    pub reaper_interval: Duration,
    pub restart: RestartPolicy,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));
        let ttl_secs: u64 = env_or("TRANSACTION_TTL_SECS", 21_600);

        Self {
            bus: BusConfig::new(
                std::env::var("BUS_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
                env_or("BUS_PORT", 5000),
            ),
            backup_service: std::env::var("BACKUP_SERVICE_NAME").unwrap_or_else(|_| "bkpsv".into()),
            restore_service: std::env::var("RESTORE_SERVICE_NAME").unwrap_or_else(|_| "rstrv".into()),
            cloud_service: std::env::var("CLOUD_SERVICE_NAME").unwrap_or_else(|_| "clcsv".into()),
            enabled_services: parse_list(
                &std::env::var("ENABLED_SERVICES").unwrap_or_else(|_| "backup,restore".into()),
            ),
            db_path: std::env::var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("catalog.db")),
            primary_root: std::env::var("PRIMARY_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("local_copy")),
            secondary_root: std::env::var("SECONDARY_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("secondary_copy")),
            data_dir,
            transaction_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            reaper_interval: Duration::from_secs(env_or("REAPER_INTERVAL_SECS", 60).max(1)),
            restart: RestartPolicy {
                initial_backoff: Duration::from_millis(env_or("RESTART_INITIAL_BACKOFF_MS", 1000)),
                max_backoff: Duration::from_millis(env_or("RESTART_MAX_BACKOFF_MS", 30_000)),
                max_attempts: std::env::var("RESTART_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok()),
            },
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }

    pub fn is_enabled(&self, service: &str) -> bool {
        self.enabled_services.iter().any(|s| s == service)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
