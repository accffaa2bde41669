//! Sync Configuration
//!
//! `sync_config.json` in the app data directory picks the store backend and
//! remembers whether the one-time local migration already ran.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::{DomainError, DomainResult};
use crate::repository::{DocumentStore, SqliteStore, StoreAdapter};

pub const CONFIG_FILE: &str = "sync_config.json";
pub const LOCAL_DB_FILE: &str = "InventoryApp.db";
pub const DOCUMENT_CACHE_FILE: &str = "documents.json";
const LOG_APP_NAME: &str = "inventory-sync";

/// Which Store Adapter backs the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backend {
    /// Device-local SQLite database
    Local { db_path: PathBuf },
    /// Shared document store; `cache_path: None` keeps it in memory
    Remote {
        #[serde(default)]
        cache_path: Option<PathBuf>,
    },
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Local {
            db_path: PathBuf::from(LOCAL_DB_FILE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub migration_completed: bool,
    /// Defaults to `<data_dir>/logs`
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl SyncConfig {
    pub fn remote(cache_path: Option<PathBuf>) -> Self {
        Self {
            backend: Backend::Remote { cache_path },
            ..Default::default()
        }
    }

    pub fn log_dir(&self, data_dir: &Path) -> PathBuf {
        resolve(data_dir, self.log_dir.as_deref().unwrap_or_else(|| Path::new("logs")))
    }
}

fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Read the config; a missing file yields the defaults
pub fn load_config(data_dir: &Path) -> DomainResult<SyncConfig> {
    let path = config_path(data_dir);
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = fs::read_to_string(&path)
        .map_err(|e| DomainError::Config(format!("read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content).map_err(|e| DomainError::Config(format!("parse {}: {}", path.display(), e)))
}

pub fn save_config(data_dir: &Path, config: &SyncConfig) -> DomainResult<()> {
    fs::create_dir_all(data_dir).map_err(|e| DomainError::Config(format!("create {}: {}", data_dir.display(), e)))?;

    let path = config_path(data_dir);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(config).map_err(|e| DomainError::Config(e.to_string()))?;
    fs::write(&tmp, json).map_err(|e| DomainError::Config(format!("write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, &path).map_err(|e| DomainError::Config(format!("replace {}: {}", path.display(), e)))?;
    Ok(())
}

/// Persist that the automatic migration has run
pub fn mark_migrated(data_dir: &Path) -> DomainResult<SyncConfig> {
    let mut config = load_config(data_dir)?;
    config.migration_completed = true;
    save_config(data_dir, &config)?;
    Ok(config)
}

/// Open the configured Store Adapter
pub fn open_store(config: &SyncConfig, data_dir: &Path) -> DomainResult<Arc<dyn StoreAdapter>> {
    let store: Arc<dyn StoreAdapter> = match &config.backend {
        Backend::Local { db_path } => {
            let path = resolve(data_dir, db_path);
            tracing::info!("opening local store at {}", path.display());
            let store = SqliteStore::open(&path).map_err(|e| DomainError::Config(e.to_string()))?;
            Arc::new(store)
        }
        Backend::Remote { cache_path: Some(cache) } => {
            let path = resolve(data_dir, cache);
            tracing::info!("opening document store cached at {}", path.display());
            let store = DocumentStore::open(&path).map_err(|e| DomainError::Config(e.to_string()))?;
            Arc::new(store)
        }
        Backend::Remote { cache_path: None } => {
            tracing::info!("opening in-memory document store");
            Arc::new(DocumentStore::in_memory())
        }
    };
    Ok(store)
}

/// Route `tracing` output into rolling log files under the configured dir
pub fn init_logging(config: &SyncConfig, data_dir: &Path) -> DomainResult<()> {
    match rolling_logger::init_logger(config.log_dir(data_dir), LOG_APP_NAME) {
        Ok(()) | Err(rolling_logger::LoggerError::AlreadyInitialized) => Ok(()),
        Err(e) => Err(DomainError::Config(format!("logger: {}", e))),
    }
}
