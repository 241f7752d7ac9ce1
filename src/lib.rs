//! # atlasstore
//!
//! One key-value contract over interchangeable storage engines:
//! - a volatile in-process ordered table
//! - a persistent log-structured-merge engine (WAL + memtable + SSTables)
//!
//! Point lookups, inserts, deletes, read-modify-write updates, ordered
//! folds, bulk import/export, and checkpoint/restore of persistent stores.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Registry (name → Store)                      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Store<K, V>                               │
//! │        (dispatch, update, fold, checkpoint)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ dyn Backend<K, V>
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Volatile   │          │ Persistent  │──► Codec
//!   │ (BTreeMap)  │          │  (Engine)   │
//!   └─────────────┘          └──────┬──────┘
//!                        ┌──────────┼──────────┐
//!                        ▼          ▼          ▼
//!                      WAL      MemTable    SSTables
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use atlasstore::{BackendKind, Options, Store};
//!
//! # fn main() -> atlasstore::Result<()> {
//! let options = Options::builder().db_dir("/var/lib/myapp").build();
//! let store: Store<String, u64> = Store::open("counters", BackendKind::Persistent, options)?;
//!
//! store.update(&"hits".to_string(), |_, current| current.unwrap_or(0) + 1)?;
//! let total = store.fold(0, |acc, _, v| acc + v)?;
//! # let _ = total;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod codec;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod backend;
pub mod store;
pub mod checkpoint;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use backend::{Backend, BackendFactory, PersistentBackend, VolatileBackend};
pub use codec::{BincodeCodec, Codec};
pub use config::{BackendKind, EngineConfig, EngineOptions, Options};
pub use engine::Engine;
pub use error::{Result, StoreError};
pub use registry::Registry;
pub use store::Store;

/// Current version of atlasstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
