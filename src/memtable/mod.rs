//! MemTable Module
//!
//! In-memory ordered write buffer of the persistent LSM engine.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Tombstones so deletes shadow older SSTable entries
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation and folds
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for SSTable generation and ordered folds)
//! - Many concurrent readers, one writer at a time

mod table;

pub use table::{MemTable, MemTableIterator};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// Approximate bytes this entry occupies
    pub(crate) fn footprint(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }
}
