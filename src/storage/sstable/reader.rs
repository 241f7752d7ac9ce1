//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::wal::read_array;

use super::iterator::SSTableIterator;
use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
pub struct SSTableReader {
    path: PathBuf,
    file: BufReader<File>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    /// Index block starting offset (end of data block)
    index_offset: u64,
    file_size: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Loads the entire index into memory for fast lookups.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(StoreError::Storage(format!(
                "SSTable {} too small: {} bytes",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(StoreError::Storage(format!(
                "Invalid SSTable magic in {}: got {:?}",
                path.display(),
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes(read_array(&header[4..6]));
        if version != VERSION {
            return Err(StoreError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = u64::from_le_bytes(read_array(&header[6..14]));

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = u64::from_le_bytes(read_array(&footer[0..8]));
        let data_crc = u32::from_le_bytes(read_array(&footer[8..12]));
        let index_crc = u32::from_le_bytes(read_array(&footer[12..16]));

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(StoreError::Storage(format!(
                "SSTable {} has index offset {} outside the file",
                path.display(),
                index_offset
            )));
        }

        // Data block CRC
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut data = vec![0u8; (index_offset - HEADER_SIZE) as usize];
        file.read_exact(&mut data)?;
        if crc32fast::hash(&data) != data_crc {
            return Err(StoreError::Storage(format!(
                "SSTable {} data block CRC mismatch",
                path.display()
            )));
        }

        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.read_exact(&mut index_data)?;
        if crc32fast::hash(&index_data) != index_crc {
            return Err(StoreError::Storage(format!(
                "SSTable {} index block CRC mismatch",
                path.display()
            )));
        }

        // [key_len(4)][offset(8)][key]
        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos + 12 <= index_data.len() {
            let key_len = u32::from_le_bytes(read_array(&index_data[pos..pos + 4])) as usize;
            let offset = u64::from_le_bytes(read_array(&index_data[pos + 4..pos + 12]));
            pos += 12;

            if pos + key_len > index_data.len() {
                return Err(StoreError::Storage(format!(
                    "SSTable {} index block truncated",
                    path.display()
                )));
            }
            index.insert(index_data[pos..pos + key_len].to_vec(), offset);
            pos += key_len;
        }

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            index,
            entry_count,
            index_offset,
            file_size,
        })
    }

    /// Get a value by key, O(log n) lookup via in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(Some(value)))`: key found with value
    /// - `Ok(Some(None))`: key found but is a tombstone
    /// - `Ok(None)`: key not in this SSTable
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Option<Vec<u8>>>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        self.file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        self.file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes(read_array(&header[0..4])) as i64;
        let val_len = u32::from_le_bytes(read_array(&header[4..8]));

        self.file.seek(SeekFrom::Current(key_len))?;

        if val_len == TOMBSTONE_MARKER {
            return Ok(Some(None));
        }

        let mut value = vec![0u8; val_len as usize];
        self.file.read_exact(&mut value)?;

        Ok(Some(Some(value)))
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }

    /// Iterate all entries in key order through a fresh file handle
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::open(&self.path, self.index_offset)
    }
}
