//! # Engine Configuration
//!
//! Three layers, each overriding the `Some` values of the previous one:
//! built-in defaults, an optional camelCase JSON file, then environment
//! variables and command line flags.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::storage::{DirectoryStorage, PlatformStorage, StorageProvider};

pub const DEFAULT_CONFIG_FILE: &str = "cfp_sync.json";
pub const APP_DIR_NAME: &str = "cfp_sync";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Conference data synchronization engine", version)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[clap(long, env = "CFP_SYNC_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "CFP_SYNC_STORAGE_DIR", help = "Private directory for cache files and the reload marker.")]
    pub storage_dir: Option<PathBuf>,

    #[clap(long, env = "CFP_SYNC_LOG_DIR", help = "Directory for JSON log files; console only when unset.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "CFP_SYNC_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "CFP_SYNC_CONNECT_TIMEOUT_SECS", help = "Connect timeout of every HTTP call, in seconds.")]
    pub connect_timeout_secs: Option<u64>,

    #[clap(long, env = "CFP_SYNC_FAN_IN_TIMEOUT_SECS", help = "Bound on the per-day session fan-in, in seconds.")]
    pub fan_in_timeout_secs: Option<u64>,

    #[clap(long, env = "CFP_SYNC_HTTP_MAX_RETRIES", help = "Retries on transient HTTP failures.")]
    pub http_max_retries: Option<u32>,

    #[clap(long, env = "CFP_SYNC_CLOUD_FUNCTIONS_URL", help = "Base URL of the cloud functions.")]
    pub cloud_functions_url: Option<String>,

    #[clap(long, env = "CFP_SYNC_NOTES_CLOUD_SYNC", help = "Reconcile notes with the cloud mirror (true/false).")]
    pub notes_cloud_sync: Option<bool>,
}

impl EngineConfig {
    /// Built-in defaults.
    pub fn defaults() -> Self {
        EngineConfig {
            log_level: Some("info".to_string()),
            connect_timeout_secs: Some(15),
            fan_in_timeout_secs: Some(120),
            http_max_retries: Some(3),
            cloud_functions_url: Some("https://cloud.devoxx.com/functions".to_string()),
            notes_cloud_sync: Some(true),
            ..Default::default()
        }
    }

    /// Merges two configs, `other` overriding `self` for `Some` values.
    pub fn merge(self, other: EngineConfig) -> EngineConfig {
        EngineConfig {
            config_path: other.config_path.or(self.config_path),
            storage_dir: other.storage_dir.or(self.storage_dir),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            connect_timeout_secs: other.connect_timeout_secs.or(self.connect_timeout_secs),
            fan_in_timeout_secs: other.fan_in_timeout_secs.or(self.fan_in_timeout_secs),
            http_max_retries: other.http_max_retries.or(self.http_max_retries),
            cloud_functions_url: other.cloud_functions_url.or(self.cloud_functions_url),
            notes_cloud_sync: other.notes_cloud_sync.or(self.notes_cloud_sync),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(15))
    }

    pub fn fan_in_timeout(&self) -> Duration {
        Duration::from_secs(self.fan_in_timeout_secs.unwrap_or(120))
    }

    pub fn http_max_retries(&self) -> u32 {
        self.http_max_retries.unwrap_or(3)
    }

    pub fn notes_cloud_sync(&self) -> bool {
        self.notes_cloud_sync.unwrap_or(true)
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// The configured storage directory, or the platform's local data directory.
    pub fn storage_provider(&self) -> Arc<dyn StorageProvider> {
        match &self.storage_dir {
            Some(dir) => Arc::new(DirectoryStorage::new(dir)),
            None => Arc::new(PlatformStorage::new(APP_DIR_NAME)),
        }
    }
}

/// Reads a JSON config file. `Ok(None)` when the file does not exist.
pub fn read_config_file(path: &Path) -> SyncResult<Option<EngineConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))
}

/// Layers defaults, the config file named by `cli` (or [`DEFAULT_CONFIG_FILE`])
/// and `cli` itself. An unreadable file is logged and skipped.
pub fn resolve_config(cli: EngineConfig) -> EngineConfig {
    let mut current = EngineConfig::defaults();

    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match read_config_file(&config_file_path) {
        Ok(Some(file_config)) => current = current.merge(file_config),
        Ok(None) => info!(
            path = %config_file_path.display(),
            "config file not found, using defaults and environment/CLI values"
        ),
        Err(e) => warn!(error = %e, "failed to read config file, falling back to other sources"),
    }

    current.merge(cli)
}

/// Parses the process arguments and environment, then resolves all layers.
pub fn load_config() -> EngineConfig {
    resolve_config(EngineConfig::parse())
}
