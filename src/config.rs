//! Runtime configuration loaded from environment variables

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::event_store::EventStoreConfig;

/// Catalog server configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Directory holding `events.jsonl`
    pub data_dir: PathBuf,
    /// HTTP listen address
    pub bind_addr: SocketAddr,
    /// Initial CQRS flag; not persisted across restarts
    pub cqrs_enabled: bool,
    /// Minimum spacing between progress notifications
    pub progress_interval: Duration,
    /// Caller-level timeout for the count read path
    pub count_timeout: Duration,
    /// fsync every appended record
    pub sync_writes: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3030)),
            cqrs_enabled: false,
            progress_interval: Duration::from_millis(250),
            count_timeout: Duration::from_secs(60),
            sync_writes: true,
        }
    }
}

impl CatalogConfig {
    /// Build the config from `CATALOG_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let data_dir = match env::var("CATALOG_DATA_DIR") {
            Ok(path) if Path::new(&path).is_absolute() => PathBuf::from(path),
            Ok(path) => current_dir.join(path),
            Err(_) => current_dir.join(&defaults.data_dir),
        };

        Self {
            data_dir,
            bind_addr: parse_var("CATALOG_BIND", defaults.bind_addr),
            cqrs_enabled: parse_var("CATALOG_CQRS", defaults.cqrs_enabled),
            progress_interval: Duration::from_millis(parse_var(
                "CATALOG_PROGRESS_INTERVAL_MS",
                defaults.progress_interval.as_millis() as u64,
            )),
            count_timeout: Duration::from_secs(parse_var(
                "CATALOG_COUNT_TIMEOUT_SECS",
                defaults.count_timeout.as_secs(),
            )),
            sync_writes: parse_var("CATALOG_SYNC_WRITES", defaults.sync_writes),
        }
    }

    /// Configuration for a catalog rooted at `data_dir`
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Event store settings derived from this config
    pub fn event_store(&self) -> EventStoreConfig {
        EventStoreConfig {
            data_dir: self.data_dir.clone(),
            sync_writes: self.sync_writes,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_value<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(
                variable = name,
                value = raw,
                fallback = ?default,
                "Ignoring unparseable setting"
            );
            default
        }
    }
}
