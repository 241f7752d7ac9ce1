//! Backend Module
//!
//! The uniform protocol every storage engine adapter implements, and the
//! one place a [`BackendKind`] is turned into a concrete adapter.
//!
//! ```text
//!            Store<K, V>
//!                │  Box<dyn Backend<K, V>>
//!       ┌────────┴─────────┐
//!       ▼                  ▼
//! VolatileBackend   PersistentBackend
//!  (BTreeMap)        (codec → LSM Engine)
//! ```

mod persistent;
mod volatile;

use std::fs;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{BackendKind, Options};
use crate::error::Result;

pub use persistent::PersistentBackend;
pub use volatile::VolatileBackend;

/// Ordered, fallible iterator over a backend's entries
pub type EntryIter<'a, K, V> = Box<dyn Iterator<Item = Result<(K, V)>> + 'a>;

/// Ordered, fallible iterator over a backend's keys
pub type KeyIter<'a, K> = Box<dyn Iterator<Item = Result<K>> + 'a>;

/// Bounds a key type needs to be stored by every backend
pub trait StoreKey: Ord + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreKey for T where T: Ord + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Bounds a value type needs to be stored by every backend
pub trait StoreValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Uniform protocol over one storage engine instance.
///
/// An instance exists only between a successful `start` and the `stop` or
/// `destroy` that consumes it, so a stopped adapter cannot be used.
pub trait Backend<K, V>: Send + Sync {
    /// Open the engine for `name`, creating on-disk state if needed
    fn start(name: &str, options: &Options) -> Result<Self>
    where
        Self: Sized;

    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str;

    /// Release engine resources; persisted state is kept
    fn stop(self: Box<Self>) -> Result<()>;

    /// Release engine resources and remove all persisted state
    fn destroy(self: Box<Self>) -> Result<()>;

    /// Durable before returning when the store was opened with `sync`
    fn put(&self, key: &K, value: &V) -> Result<()>;

    /// `Err(StoreError::NotFound)` when the key is absent
    fn get(&self, key: &K) -> Result<V>;

    /// Removing an absent key is not an error
    fn delete(&self, key: &K) -> Result<()>;

    /// Write every entry as one batch; later duplicates win
    fn write_batch(&self, entries: Vec<(K, V)>) -> Result<()>;

    /// Entries in the engine's natural key order
    ///
    /// Weakly consistent: writes racing with the call may or may not be
    /// included.
    fn entries(&self) -> Result<EntryIter<'_, K, V>>;

    /// Keys in the engine's natural key order
    fn keys(&self) -> Result<KeyIter<'_, K>>;

    /// Engine-specific internals, if the engine reports any
    fn status(&self) -> Option<String> {
        None
    }
}

/// Creates a started backend for a store name; used again on restart
pub type BackendFactory<K, V> =
    Arc<dyn Fn(&str, &Options) -> Result<Box<dyn Backend<K, V>>> + Send + Sync>;

/// Factory for the built-in adapter of `kind`
pub fn factory<K: StoreKey, V: StoreValue>(kind: BackendKind) -> BackendFactory<K, V> {
    match kind {
        BackendKind::Volatile => Arc::new(|name: &str, options: &Options| {
            Ok(Box::new(VolatileBackend::<K, V>::start(name, options)?) as Box<dyn Backend<K, V>>)
        }),
        BackendKind::Persistent => Arc::new(|name: &str, options: &Options| {
            Ok(Box::new(PersistentBackend::<K, V>::start(name, options)?) as Box<dyn Backend<K, V>>)
        }),
    }
}

/// Remove whatever a stopped store of `kind` left behind
pub fn purge(kind: BackendKind, name: &str, options: &Options) -> Result<()> {
    match kind {
        BackendKind::Volatile => Ok(()),
        BackendKind::Persistent => {
            let dir = options.store_dir(name);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
                tracing::info!(store = name, dir = %dir.display(), "Removed store files");
            }
            Ok(())
        }
    }
}
