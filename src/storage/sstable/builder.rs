//! SSTable Builder
//!
//! Streams sorted entries into a new table file. Entries are encoded once
//! into a scratch buffer, which feeds both the file and the data CRC.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

use super::{encode_entry, SSTable, COUNT_OFFSET, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Writes one SSTable; keys must arrive in strictly increasing order
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    scratch: Vec<u8>,
    /// Offset the next entry will be written at
    offset: u64,
    /// (key, entry offset), in key order
    index: Vec<(Vec<u8>, u64)>,
    tombstone_count: u64,
    data_crc: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create (or truncate) `path` and write the header.
    ///
    /// The entry count is a placeholder until `finish`.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            scratch: Vec::new(),
            offset: HEADER_SIZE,
            index: Vec::new(),
            tombstone_count: 0,
            data_crc: crc32fast::Hasher::new(),
        })
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if value.len() >= TOMBSTONE_MARKER as usize {
            return Err(StoreError::Storage(format!(
                "value of {} bytes exceeds SSTable limit",
                value.len()
            )));
        }
        self.append(key, Some(value))
    }

    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.tombstone_count += 1;
        self.append(key, None)
    }

    fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some((last, _)) = self.index.last() {
            if key <= last.as_slice() {
                return Err(StoreError::Storage(
                    "SSTable keys must be added in strictly increasing order".to_string(),
                ));
            }
        }

        self.scratch.clear();
        encode_entry(&mut self.scratch, key, value);
        self.writer.write_all(&self.scratch)?;
        self.data_crc.update(&self.scratch);

        self.index.push((key.to_vec(), self.offset));
        self.offset += self.scratch.len() as u64;
        Ok(())
    }

    /// Write index and footer, patch the entry count, fsync
    pub fn finish(mut self) -> Result<SSTable> {
        let index_offset = self.offset;

        let mut index_block = Vec::new();
        for (key, offset) in &self.index {
            index_block.extend_from_slice(&(key.len() as u32).to_le_bytes());
            index_block.extend_from_slice(&offset.to_le_bytes());
            index_block.extend_from_slice(key);
        }
        self.writer.write_all(&index_block)?;

        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&self.data_crc.finalize().to_le_bytes())?;
        self.writer.write_all(&crc32fast::hash(&index_block).to_le_bytes())?;

        let entry_count = self.index.len() as u64;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| StoreError::Storage(format!("Failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();
        let min_key = self.index.first().map(|(k, _)| k.clone()).unwrap_or_default();
        let max_key = self.index.last().map(|(k, _)| k.clone()).unwrap_or_default();

        Ok(SSTable {
            path: self.path,
            entry_count,
            tombstone_count: self.tombstone_count,
            min_key,
            max_key,
            file_size,
        })
    }
}
