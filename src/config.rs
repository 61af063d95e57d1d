//! Registry configuration loaded from TOML.
//!
//! ```toml
//! retries = 5
//! retry_backoff_ms = 10
//!
//! [store]
//! backend = "sqlite"
//! path = "/var/lib/schemareg/registry.db"
//! table = "schema_registry"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::UpdateRetryer;
use crate::storage::sqlite::DEFAULT_TABLE;
use crate::storage::{MemoryStore, SqliteStore, SqliteStoreOptions, VersionedStore};
use crate::types::Result;

/// Top-level registry configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Maximum commit attempts per write request; must be positive.
    pub retries: u32,
    /// Base backoff between conflicting attempts, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Backing store selection.
    pub store: StoreConfig,
}

/// `[store]` section.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Store implementation to open.
    pub backend: StoreBackend,
    /// Database file for the sqlite backend.
    pub path: Option<PathBuf>,
    /// SQLite table holding the documents.
    pub table: String,
    /// SQLite busy timeout, in milliseconds.
    pub busy_timeout_ms: u64,
}

/// Which [`VersionedStore`] implementation to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local; contents vanish on exit.
    #[default]
    Memory,
    /// SQLite database file shared between processes.
    Sqlite,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retries: UpdateRetryer::DEFAULT_RETRIES,
            retry_backoff_ms: 0,
            store: StoreConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            table: DEFAULT_TABLE.to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

impl RegistryConfig {
    /// Loads the config from `explicit`, or the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> std::result::Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let config = match path {
            Some(path) if path.exists() => read_file(&path)?,
            _ => RegistryConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, ConfigError> {
        let config: RegistryConfig =
            toml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero retries, a sqlite backend without a path and an empty table name.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.retries == 0 {
            return Err(ConfigError::Invalid("retries must be at least 1".into()));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Invalid(
                "store.path is required for the sqlite backend".into(),
            ));
        }
        if self.store.table.is_empty() {
            return Err(ConfigError::Invalid("store.table must not be empty".into()));
        }
        Ok(())
    }

    /// Builds the commit retry driver.
    pub fn retryer(&self) -> Result<UpdateRetryer> {
        Ok(UpdateRetryer::new(self.retries)?
            .with_backoff(Duration::from_millis(self.retry_backoff_ms)))
    }

    /// Opens the configured store.
    pub fn open_store(&self) -> Result<Arc<dyn VersionedStore>> {
        match self.store.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::Sqlite => {
                let opts = SqliteStoreOptions {
                    table: self.store.table.clone(),
                    busy_timeout: Duration::from_millis(self.store.busy_timeout_ms),
                    ..SqliteStoreOptions::default()
                };
                let store = match &self.store.path {
                    Some(path) => SqliteStore::open(path, opts)?,
                    None => SqliteStore::open_in_memory(opts)?,
                };
                Ok(Arc::new(store))
            }
        }
    }
}

fn read_file(path: &Path) -> std::result::Result<RegistryConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `<config dir>/schemareg/config.toml`, when a config dir exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("schemareg").join("config.toml"))
}

/// Errors loading or validating a [`RegistryConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config {path}: {source}", path = .path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML or has unknown keys.
    #[error("failed to parse config {path}: {source}", path = .path.display())]
    Parse {
        /// File that failed, or `<inline>` for text.
        path: PathBuf,
        /// Parser error.
        source: toml::de::Error,
    },
    /// Parsed, but the values are unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}
