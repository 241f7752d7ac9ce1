//! Storage Module
//!
//! Immutable on-disk layer of the persistent engine.
//!
//! ## Responsibilities
//! - Persist flushed memtables to disk in sorted format
//! - Point lookups newest → oldest
//! - Merged, ordered scans across every SSTable (for folds)
//! - Full compaction into a single SSTable

mod sstable;
mod manager;

pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
pub use manager::{StorageManager, SSTableStats};
