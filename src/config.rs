//! Configuration for atlasstore
//!
//! Two layers:
//! - [`Options`]: what a caller passes when creating a store (`db_dir`,
//!   `db_opts`, `sync`) plus the [`BackendKind`] selection
//! - [`EngineConfig`]: the fully resolved configuration of one persistent
//!   LSM engine instance, derived from `Options` and the store name

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, StoreError};

// =============================================================================
// Backend Selection
// =============================================================================

/// Which backend adapter a store is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// In-process ordered table; contents are lost when the store stops
    Volatile,

    /// Log-structured-merge engine persisted under `db_dir/<name>`
    Persistent,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "volatile" | "ets" | "memory" => Ok(BackendKind::Volatile),
            "persistent" | "lsm" | "leveldb" => Ok(BackendKind::Persistent),
            other => Err(StoreError::Config(format!(
                "unrecognized backend '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Volatile => f.write_str("volatile"),
            BackendKind::Persistent => f.write_str("persistent"),
        }
    }
}

// =============================================================================
// Store Options
// =============================================================================

/// Engine tuning knobs (`db_opts`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Create the on-disk directory when it does not exist
    pub create_if_missing: bool,

    /// Refuse to open a directory that already holds engine files
    pub error_if_exists: bool,

    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
        }
    }
}

/// Per-store options recognized by the backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Directory prefix under which each persistent store gets its own
    /// subdirectory named after the store
    pub db_dir: PathBuf,

    /// Engine-specific tuning
    pub db_opts: EngineOptions,

    /// fsync every write before acknowledging it
    pub sync: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("."),
            db_opts: EngineOptions::default(),
            sync: true,
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Parse options from `name = value` string pairs.
    ///
    /// Recognized names: `db_dir`, `sync`, `create_if_missing`,
    /// `error_if_exists`, `memtable_size_limit`. Anything else is a
    /// configuration error.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Options::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "db_dir" => options.db_dir = PathBuf::from(value),
                "sync" => options.sync = parse_bool(key, value)?,
                "create_if_missing" => {
                    options.db_opts.create_if_missing = parse_bool(key, value)?
                }
                "error_if_exists" => options.db_opts.error_if_exists = parse_bool(key, value)?,
                "memtable_size_limit" => {
                    options.db_opts.memtable_size_limit = value.parse().map_err(|_| {
                        StoreError::Config(format!("{} expects a byte count, got '{}'", key, value))
                    })?
                }
                other => {
                    return Err(StoreError::Config(format!("unrecognized option '{}'", other)))
                }
            }
        }

        options.validate()?;
        Ok(options)
    }

    /// Reject option combinations no backend can honor
    pub fn validate(&self) -> Result<()> {
        if self.db_opts.memtable_size_limit == 0 {
            return Err(StoreError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        if self.db_dir.as_os_str().is_empty() {
            return Err(StoreError::Config("db_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Directory holding the on-disk files of the named persistent store
    pub fn store_dir(&self, name: &str) -> PathBuf {
        self.db_dir.join(name)
    }

    /// Resolve the engine configuration for the named store
    pub fn engine_config(&self, name: &str) -> EngineConfig {
        EngineConfig::builder()
            .data_dir(self.store_dir(name))
            .wal_sync_strategy(if self.sync {
                WalSyncStrategy::EveryWrite
            } else {
                WalSyncStrategy::EveryNEntries { count: 100 }
            })
            .memtable_size_limit(self.db_opts.memtable_size_limit)
            .create_if_missing(self.db_opts.create_if_missing)
            .error_if_exists(self.db_opts.error_if_exists)
            .build()
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(StoreError::Config(format!(
            "{} expects a boolean, got '{}'",
            key, value
        ))),
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the directory prefix for persistent stores
    pub fn db_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.db_dir = path.into();
        self
    }

    /// Replace the engine tuning map
    pub fn db_opts(mut self, db_opts: EngineOptions) -> Self {
        self.options.db_opts = db_opts;
        self
    }

    /// Set whether writes fsync before returning
    pub fn sync(mut self, sync: bool) -> Self {
        self.options.sync = sync;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.options.db_opts.memtable_size_limit = size;
        self
    }

    /// Set whether a missing directory is created on open
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.options.db_opts.create_if_missing = create;
        self
    }

    /// Set whether opening an existing store is an error
    pub fn error_if_exists(mut self, error: bool) -> Self {
        self.options.db_opts.error_if_exists = error;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Configuration for one persistent engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for all data files (WAL, SSTables, etc.)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    /// Create `data_dir` when missing
    pub create_if_missing: bool,

    /// Fail when `data_dir` already holds engine files
    pub error_if_exists: bool,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasstore_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Default config rooted at `path`
    pub fn at(path: &Path) -> Self {
        Self::builder().data_dir(path).build()
    }
}

/// Builder for EngineConfig
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    pub fn error_if_exists(mut self, error: bool) -> Self {
        self.config.error_if_exists = error;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("ets".parse::<BackendKind>().unwrap(), BackendKind::Volatile);
        assert_eq!("LevelDB".parse::<BackendKind>().unwrap(), BackendKind::Persistent);
        assert!(matches!(
            "mnesia".parse::<BackendKind>(),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_from_pairs_overrides_defaults() {
        let options = Options::from_pairs([
            ("db_dir", "/tmp/stores"),
            ("sync", "false"),
            ("memtable_size_limit", "1024"),
        ])
        .unwrap();

        assert_eq!(options.db_dir, PathBuf::from("/tmp/stores"));
        assert!(!options.sync);
        assert_eq!(options.db_opts.memtable_size_limit, 1024);
        assert!(options.db_opts.create_if_missing);
    }

    #[test]
    fn test_from_pairs_rejects_unknown_option() {
        let result = Options::from_pairs([("compression", "snappy")]);
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_from_pairs_rejects_bad_bool() {
        let result = Options::from_pairs([("sync", "sometimes")]);
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_store_dir_nests_name_under_db_dir() {
        let options = Options::builder().db_dir("/var/lib/kv").build();
        assert_eq!(options.store_dir("users"), PathBuf::from("/var/lib/kv/users"));
    }

    #[test]
    fn test_sync_maps_to_wal_strategy() {
        let synced = Options::builder().sync(true).build().engine_config("a");
        assert_eq!(synced.wal_sync_strategy, WalSyncStrategy::EveryWrite);

        let lazy = Options::builder().sync(false).build().engine_config("a");
        assert!(matches!(
            lazy.wal_sync_strategy,
            WalSyncStrategy::EveryNEntries { .. }
        ));
    }
}
