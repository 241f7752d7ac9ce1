//! Write-Ahead Log (WAL) Module
//!
//! Every engine mutation is appended here before it touches the memtable.
//! On open the engine replays the log, flushes what it recovered, and
//! truncates the file.
//!
//! ## Record Layout
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────────────────┐
//! │ LSN (8)  │ CRC (4)  │ Len (4)  │ Data (Len bytes)            │
//! └──────────┴──────────┴──────────┴─────────────────────────────┘
//!   Data = bincode((Operation, timestamp_ms))
//!   CRC  = crc32(LSN ‖ Len ‖ Data)
//! ```
//! Records are back to back with no file header. Recovery stops at the
//! first record that is short or fails its CRC and cuts the file there.
//!
//! A write batch is a single `Operation::Batch` record, so a torn batch is
//! dropped as a whole.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE};
pub(crate) use entry::read_array;
pub use writer::WalWriter;
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};
