//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Merge every SSTable into one ordered view for scans and compaction

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::memtable::{MemTable, MemTableEntry};

use super::{SSTable, SSTableBuilder, SSTableReader};

/// Per-SSTable numbers reported by engine status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSTableStats {
    pub file_name: String,
    pub entry_count: u64,
    pub file_size: u64,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock. Lookups take the write side because
///   `SSTableReader::get` seeks its file handle; scans take the read side
///   and iterate through handles of their own.
/// - `next_sstable_id`: Atomic counter
pub struct StorageManager {
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<SSTableReader>>,

    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing SSTable files
    /// 3. Open readers for each (loads indexes into RAM)
    /// 4. Order by ID descending (newest first)
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut sstable_ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = Self::parse_sstable_id(&file_path) {
                    sstable_ids.push(id);
                }
            }
        }

        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            sstables.push(SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?);
        }

        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Get a value by key (searches all SSTables newest → oldest)
    ///
    /// Returns `Ok(None)` when the key is absent everywhere or its newest
    /// entry is a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut sstables = self.sstables.write();

        for reader in sstables.iter_mut() {
            if !reader.might_contain(key) {
                continue;
            }
            if let Some(found) = reader.get(key)? {
                return Ok(found);
            }
        }

        Ok(None)
    }

    /// Flush a MemTable to a new SSTable
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        if memtable.is_empty() {
            return Err(StoreError::Storage("Cannot flush empty MemTable".to_string()));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        let built = Self::write_memtable(&path, memtable).and_then(|metadata| {
            SSTableReader::open(&path).map(|reader| (metadata, reader))
        });
        let (metadata, reader) = match built {
            Ok(built) => built,
            Err(e) => {
                // A half-written table would fail the next open
                if path.exists() {
                    if let Err(remove_err) = fs::remove_file(&path) {
                        tracing::warn!(
                            sstable = %path.display(),
                            error = %remove_err,
                            "Failed to remove partial SSTable"
                        );
                    }
                }
                return Err(e);
            }
        };
        self.sstables.write().insert(0, reader);

        tracing::debug!(
            sstable = %path.display(),
            entries = metadata.entry_count,
            "Flushed memtable"
        );

        Ok(metadata)
    }

    /// Merge every SSTable into `into`, newest entry per key winning.
    ///
    /// Keys already present in `into` are left alone, so a caller can seed
    /// the map with fresher (memtable) entries first. `None` marks a
    /// tombstone.
    pub fn merge_into(&self, into: &mut BTreeMap<Vec<u8>, Option<Vec<u8>>>) -> Result<()> {
        let sstables = self.sstables.read();
        for reader in sstables.iter() {
            for item in reader.iter()? {
                let (key, value) = item?;
                into.entry(key).or_insert(value);
            }
        }
        Ok(())
    }

    /// Rewrite every SSTable into a single one without tombstones
    ///
    /// Must only run while no flush is in progress (the engine holds its
    /// write lock).
    pub fn compact(&self) -> Result<Option<SSTable>> {
        if self.sstable_count() < 2 {
            return Ok(None);
        }

        let mut merged = BTreeMap::new();
        self.merge_into(&mut merged)?;

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);
        let mut builder = SSTableBuilder::new(&path)?;
        for (key, value) in merged.iter() {
            if let Some(v) = value {
                builder.add(key, v)?;
            }
        }
        let metadata = builder.finish()?;
        let reader = SSTableReader::open(&path)?;

        let old = {
            let mut sstables = self.sstables.write();
            std::mem::replace(&mut *sstables, vec![reader])
        };
        for reader in old {
            fs::remove_file(reader.path())?;
        }

        tracing::info!(
            sstable = %path.display(),
            entries = metadata.entry_count,
            "Compacted SSTables"
        );

        Ok(Some(metadata))
    }

    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Numbers for every SSTable, newest first
    pub fn stats(&self) -> Vec<SSTableStats> {
        self.sstables
            .read()
            .iter()
            .map(|reader| SSTableStats {
                file_name: reader
                    .path()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                entry_count: reader.entry_count(),
                file_size: reader.file_size(),
            })
            .collect()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    /// True when `dir` holds at least one SSTable file
    pub fn has_sstables(dir: &Path) -> Result<bool> {
        if !dir.is_dir() {
            return Ok(false);
        }
        for entry in fs::read_dir(dir)? {
            if Self::parse_sstable_id(&entry?.path()).is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_memtable(path: &Path, memtable: &MemTable) -> Result<SSTable> {
        let mut builder = SSTableBuilder::new(path)?;
        for (key, entry) in memtable.iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(&key, &v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
            }
        }
        builder.finish()
    }

    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("sstable_")?.parse().ok()
    }
}
