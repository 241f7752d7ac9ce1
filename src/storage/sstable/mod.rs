//! SSTable Module
//!
//! Immutable, sorted run of key/value-or-tombstone entries written by a
//! memtable flush or a compaction.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                        │
//! │   Magic: "ATST" (4) | Version: u16 (2) | Count: u64 (8)  │
//! ├──────────────────────────────────────────────────────────┤
//! │ Data Block                                               │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]  per entry      │
//! │   ValLen = u32::MAX marks a tombstone (no value bytes)   │
//! ├──────────────────────────────────────────────────────────┤
//! │ Index Block                                              │
//! │   [KeyLen: u32][Offset: u64][Key]  per entry             │
//! ├──────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                        │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) | IndexCRC (4) │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian. Both CRCs are checked when a table is
//! opened, so a reader never serves bytes from a damaged file.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

pub(crate) const MAGIC: &[u8; 4] = b"ATST";

pub(crate) const VERSION: u16 = 2;

/// Magic (4) + Version (2) + EntryCount (8)
pub(crate) const HEADER_SIZE: u64 = 14;

/// IndexOffset (8) + DataCRC (4) + IndexCRC (4)
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Byte offset of the entry count inside the header
pub(crate) const COUNT_OFFSET: u64 = 6;

/// `ValLen` of a tombstone entry
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Per-entry prefix: KeyLen (4) + ValLen (4)
pub(crate) const ENTRY_PREFIX_SIZE: usize = 8;

/// Summary of a finished table
#[derive(Debug, Clone)]
pub struct SSTable {
    pub path: PathBuf,
    /// Every entry, tombstones included
    pub entry_count: u64,
    pub tombstone_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
}

impl SSTable {
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Entries that carry a value
    pub fn live_count(&self) -> u64 {
        self.entry_count - self.tombstone_count
    }

    /// False when `key` lies outside `[min_key, max_key]`
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.entry_count > 0 && key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}

/// Append one data-block entry to `buf`
pub(crate) fn encode_entry(buf: &mut Vec<u8>, key: &[u8], value: Option<&[u8]>) {
    let val_len = value.map_or(TOMBSTONE_MARKER, |v| v.len() as u32);
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&val_len.to_le_bytes());
    buf.extend_from_slice(key);
    if let Some(v) = value {
        buf.extend_from_slice(v);
    }
}
