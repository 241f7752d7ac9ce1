//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{Result, StoreError};
use super::{Operation, WalEntry, WalRecovery};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// LSN the next appended entry receives
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
    /// Set when a failed append could not be rolled back; the file may end
    /// in a torn record, so nothing more may be appended after it
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// An existing file is scanned so LSNs continue after the last valid
    /// entry.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let last_lsn = if path.exists() {
            WalRecovery::verify(path)?.last_lsn
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn: last_lsn + 1,
            sync_strategy,
            unsynced: 0,
            poisoned: false,
        })
    }

    /// Append an operation to the WAL, returning its LSN
    ///
    /// The record is handed to the OS before returning; it is fsynced
    /// according to the sync strategy. A failed append leaves the file as
    /// it was before the call, so later records never land behind a torn
    /// one.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        if self.poisoned {
            return Err(StoreError::EngineWrite(format!(
                "WAL {} ends in an unrecoverable partial record",
                self.path.display()
            )));
        }

        let lsn = self.next_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;
        let start = self.writer.get_ref().metadata()?.len();

        match self.write_record(&bytes) {
            Ok(synced) => {
                if !synced {
                    self.unsynced += 1;
                }
                self.next_lsn += 1;
                Ok(lsn)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback(start) {
                    tracing::error!(
                        path = %self.path.display(),
                        error = %rollback_err,
                        "WAL rollback failed; refusing further appends"
                    );
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    /// Write and flush one record, fsyncing when due; true if fsynced
    fn write_record(&mut self, bytes: &[u8]) -> Result<bool> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced + 1 >= count.max(1),
        };
        if due {
            self.sync()?;
        }
        Ok(due)
    }

    /// Drop whatever a failed append left behind: bytes still buffered and
    /// bytes past `len` on disk
    fn rollback(&mut self, len: u64) -> Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the buffer without writing it out
        let (_, _discarded) = stale.into_parts();

        let file = self.writer.get_ref();
        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every entry and restart LSNs at 1
    ///
    /// Called once the entries are durable elsewhere (an SSTable).
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.next_lsn = 1;
        self.unsynced = 0;
        self.poisoned = false;
        Ok(())
    }

    /// Get the current LSN (the one the next append receives)
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// LSN of the last appended entry, 0 if none
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn.saturating_sub(1)
    }

    /// Entries written but not yet fsynced
    pub fn unsynced_entries(&self) -> usize {
        self.unsynced
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "WAL flush on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(key: &str) -> Operation {
        Operation::Put {
            key: key.as_bytes().to_vec(),
            value: b"v".to_vec(),
        }
    }

    #[test]
    fn test_rollback_discards_torn_and_buffered_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        let mut writer = WalWriter::open(&path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("a")).unwrap();
        let committed_len = std::fs::metadata(&path).unwrap().len();

        // A partial record on disk plus more of it still in the buffer
        writer.writer.get_mut().write_all(&[0xAB; 10]).unwrap();
        writer.writer.write_all(&[0xCD; 5]).unwrap();

        writer.rollback(committed_len).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), committed_len);

        writer.append(put("b")).unwrap();
        drop(writer);

        let (entries, result) = WalRecovery::recover(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].operation, put("b"));
        assert!(!result.was_truncated);
    }

    #[test]
    fn test_poisoned_writer_refuses_appends_until_truncated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        let mut writer = WalWriter::open(&path, WalSyncStrategy::EveryWrite).unwrap();
        writer.poisoned = true;

        assert!(matches!(writer.append(put("a")), Err(StoreError::EngineWrite(_))));
        assert_eq!(writer.current_lsn(), 1);

        writer.truncate().unwrap();
        assert!(!writer.is_poisoned());
        assert_eq!(writer.append(put("a")).unwrap(), 1);
    }
}
