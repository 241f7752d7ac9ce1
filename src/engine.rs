//! Engine Module
//!
//! The log-structured-merge engine behind the persistent backend.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Handle concurrent read/write access
//! - Trigger flushes when MemTable is full
//! - Manage crash recovery on startup
//! - Atomic write batches and ordered full scans

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::{Result, StoreError};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::{SSTableStats, StorageManager};
use crate::wal::{Operation, WalRecovery, WalWriter};

/// The persistent storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/batch/flush/compact): Serialized by `write_lock`
///   - Only ONE write operation at a time
///   - Order: write_lock → WAL → memtable → storage
///
/// - **Reads** (get/scan): no write_lock
///   - MemTable uses internal RwLock (many concurrent readers)
///   - StorageManager takes its own lock for SSTable reads
///
/// Scans are weakly consistent: a write committing while a scan runs may or
/// may not be observed.
pub struct Engine {
    config: EngineConfig,

    /// Directory for SSTables
    storage_dir: PathBuf,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write operations
    write_lock: Mutex<()>,
}

/// Engine-reported internals, rendered by `Display` as a status block
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub data_dir: PathBuf,
    pub memtable_bytes: usize,
    pub memtable_entries: usize,
    pub last_lsn: u64,
    pub unsynced_wal_entries: usize,
    pub sstables: Vec<SSTableStats>,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "data_dir: {}", self.data_dir.display())?;
        writeln!(
            f,
            "memtable: {} entries, {} bytes",
            self.memtable_entries, self.memtable_bytes
        )?;
        writeln!(
            f,
            "wal: last_lsn={} unsynced={}",
            self.last_lsn, self.unsynced_wal_entries
        )?;
        writeln!(f, "                               SSTables")?;
        writeln!(f, "--------------------------------------------------")?;
        writeln!(f, "{:<22}{:>12}{:>16}", "File", "Entries", "Size(bytes)")?;
        writeln!(f, "--------------------------------------------------")?;
        for table in &self.sstables {
            writeln!(
                f,
                "{:<22}{:>12}{:>16}",
                table.file_name, table.entry_count, table.file_size
            )?;
        }
        Ok(())
    }
}

impl Engine {
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory (per `create_if_missing`)
    /// 2. Refuse existing data when `error_if_exists` is set
    /// 3. Load existing SSTables
    /// 4. Replay the WAL, flush what it held, truncate it
    pub fn open(config: EngineConfig) -> Result<Self> {
        let data_dir = config.data_dir.clone();
        let storage_dir = data_dir.join(Self::SSTABLE_DIR);
        let wal_path = data_dir.join(Self::WAL_FILENAME);

        if !data_dir.exists() {
            if !config.create_if_missing {
                return Err(StoreError::Storage(format!(
                    "{} does not exist and create_if_missing is false",
                    data_dir.display()
                )));
            }
            fs::create_dir_all(&data_dir)?;
        } else if config.error_if_exists && Self::holds_data(&data_dir)? {
            return Err(StoreError::Storage(format!(
                "{} already exists and error_if_exists is true",
                data_dir.display()
            )));
        }

        let storage = StorageManager::open(&storage_dir)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    recovered = recovery.entries_recovered,
                    corrupted = recovery.entries_corrupted,
                    last_lsn = recovery.last_lsn,
                    "WAL recovery"
                );
            }

            for entry in entries {
                memtable.apply(Self::memtable_entries(entry.operation));
            }

            if !memtable.is_empty() {
                tracing::debug!(
                    entries = memtable.entry_count(),
                    "Flushing recovered entries to SSTable"
                );
                storage.flush(&memtable)?;
                memtable.clear();
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        // Recovered data is durable in SSTables now
        wal.truncate()?;

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
        })
    }

    /// Open with default config rooted at `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(EngineConfig::at(path))
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return match entry {
                MemTableEntry::Value(value) => Ok(Some(value)),
                MemTableEntry::Tombstone => Ok(None),
            };
        }

        self.storage.get(key)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Delete a key; deleting an absent key is not an error
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.write(Operation::Delete { key: key.to_vec() })
    }

    /// Apply a sequence of puts/deletes atomically
    ///
    /// The whole batch is one WAL record: after a crash either every
    /// operation is recovered or none is. Later operations on the same key
    /// win.
    pub fn write_batch(&self, ops: Vec<Operation>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if ops.iter().any(|op| matches!(op, Operation::Batch { .. })) {
            return Err(StoreError::Storage("nested write batches are not supported".to_string()));
        }
        self.write(Operation::Batch { ops })
    }

    /// WAL first, then memtable, then flush if due
    ///
    /// The write is committed once it is in the WAL and the memtable. A
    /// flush that fails afterwards is logged and retried by the next write
    /// (the memtable is still over its limit) or by `flush`/`close`.
    fn write(&self, operation: Operation) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        self.wal.lock().append(operation.clone())?;

        let new_size = self.memtable.apply(Self::memtable_entries(operation));

        if new_size >= self.config.memtable_size_limit {
            if let Err(e) = self.flush_internal() {
                tracing::warn!(
                    data_dir = %self.config.data_dir.display(),
                    memtable_bytes = new_size,
                    error = %e,
                    "Memtable flush failed; keeping entries in memtable and WAL"
                );
            }
        }

        Ok(())
    }

    /// Ordered snapshot of every live entry
    pub fn scan(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .merged()?
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    /// Ordered snapshot of every live key
    pub fn scan_keys(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .merged()?
            .into_iter()
            .filter_map(|(k, v)| v.map(|_| k))
            .collect())
    }

    fn merged(&self) -> Result<BTreeMap<Vec<u8>, Option<Vec<u8>>>> {
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = self
            .memtable
            .iter()
            .map(|(k, entry)| match entry {
                MemTableEntry::Value(v) => (k, Some(v)),
                MemTableEntry::Tombstone => (k, None),
            })
            .collect();
        self.storage.merge_into(&mut merged)?;
        Ok(merged)
    }

    /// Flush memtable to disk regardless of its size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Called with write lock held
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable)?;
        self.memtable.clear();
        self.wal.lock().truncate()?;

        Ok(())
    }

    /// Flush, then merge all SSTables into one without tombstones
    pub fn compact(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()?;
        self.storage.compact()?;
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        self.wal.lock().sync()?;
        tracing::debug!(data_dir = %self.config.data_dir.display(), "Engine closed");
        Ok(())
    }

    /// Current internals
    pub fn stats(&self) -> EngineStats {
        let (last_lsn, unsynced_wal_entries) = {
            let wal = self.wal.lock();
            (wal.last_lsn(), wal.unsynced_entries())
        };
        EngineStats {
            data_dir: self.config.data_dir.clone(),
            memtable_bytes: self.memtable.size(),
            memtable_entries: self.memtable.entry_count(),
            last_lsn,
            unsynced_wal_entries,
            sstables: self.storage.stats(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn memtable_entries(operation: Operation) -> Vec<(Vec<u8>, MemTableEntry)> {
        match operation {
            Operation::Put { key, value } => vec![(key, MemTableEntry::Value(value))],
            Operation::Delete { key } => vec![(key, MemTableEntry::Tombstone)],
            Operation::Batch { ops } => ops.into_iter().flat_map(Self::memtable_entries).collect(),
        }
    }

    /// True when `dir` already holds a non-empty WAL or any SSTable
    fn holds_data(dir: &Path) -> Result<bool> {
        let wal_path = dir.join(Self::WAL_FILENAME);
        if wal_path.exists() && fs::metadata(&wal_path)?.len() > 0 {
            return Ok(true);
        }
        StorageManager::has_sstables(&dir.join(Self::SSTABLE_DIR))
    }
}
