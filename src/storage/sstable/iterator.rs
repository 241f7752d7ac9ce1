//! SSTable Iterator
//!
//! Walks the data block through its own file handle, so scans never
//! contend with point lookups on the reader's handle.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;
use crate::wal::read_array;

use super::{ENTRY_PREFIX_SIZE, HEADER_SIZE, TOMBSTONE_MARKER};

/// Entries of one table in key order; `None` values are tombstones
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Bytes of data block not yet consumed
    remaining: u64,
}

impl SSTableIterator {
    pub(super) fn open(path: &Path, index_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            remaining: index_offset.saturating_sub(HEADER_SIZE),
        })
    }

    fn read_entry(&mut self) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let mut prefix = [0u8; ENTRY_PREFIX_SIZE];
        self.file.read_exact(&mut prefix)?;
        let key_len = u32::from_le_bytes(read_array(&prefix[0..4])) as usize;
        let val_len = u32::from_le_bytes(read_array(&prefix[4..8]));

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;

        let value = match val_len {
            TOMBSTONE_MARKER => None,
            len => {
                let mut value = vec![0u8; len as usize];
                self.file.read_exact(&mut value)?;
                Some(value)
            }
        };

        let consumed = (ENTRY_PREFIX_SIZE + key_len) as u64 + value.as_ref().map_or(0, |v| v.len() as u64);
        self.remaining = self.remaining.saturating_sub(consumed);
        Ok((key, value))
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<(Vec<u8>, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let entry = self.read_entry();
        if entry.is_err() {
            // Never resume mid-entry
            self.remaining = 0;
        }
        Some(entry)
    }
}
