//! Registry Module
//!
//! Name → store lookup for code that should not have to pass handles
//! around. A registry is an ordinary value: create one at startup, hand it
//! (or an `Arc` of it) to whoever needs lookups, and `shutdown` it at exit.
//! Dropping a registry does not stop its stores.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{StoreKey, StoreValue};
use crate::config::{BackendKind, Options};
use crate::error::{Result, StoreError};
use crate::store::Store;

/// Live stores by name
pub struct Registry<K, V> {
    stores: RwLock<HashMap<String, Arc<Store<K, V>>>>,
}

impl<K: StoreKey, V: StoreValue> Registry<K, V> {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Open a store and register it under `name`
    ///
    /// Fails with `EngineOpen` when `name` is already live.
    pub fn create(&self, name: &str, kind: BackendKind, options: Options) -> Result<Arc<Store<K, V>>> {
        let mut stores = self.stores.write();
        if stores.contains_key(name) {
            return Err(StoreError::engine_open(name, "a store with this name is already open"));
        }

        let store = Arc::new(Store::open(name, kind, options)?);
        stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Register an already opened store
    pub fn insert(&self, store: Store<K, V>) -> Result<Arc<Store<K, V>>> {
        let mut stores = self.stores.write();
        if stores.contains_key(store.name()) {
            return Err(StoreError::engine_open(
                store.name(),
                "a store with this name is already open",
            ));
        }

        let store = Arc::new(store);
        stores.insert(store.name().to_string(), Arc::clone(&store));
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Store<K, V>>> {
        self.stores.read().get(name).cloned()
    }

    /// Like [`Registry::get`], but an unknown name is `EngineClosed`
    pub fn require(&self, name: &str) -> Result<Arc<Store<K, V>>> {
        self.get(name)
            .ok_or_else(|| StoreError::EngineClosed(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }

    /// Unregister and stop `name`; returns the stopped store if it existed
    pub fn remove(&self, name: &str) -> Result<Option<Arc<Store<K, V>>>> {
        let removed = self.stores.write().remove(name);
        if let Some(store) = &removed {
            store.stop()?;
        }
        Ok(removed)
    }

    /// Unregister `name` and remove all of its persisted state
    pub fn destroy(&self, name: &str) -> Result<()> {
        match self.stores.write().remove(name) {
            Some(store) => store.destroy(),
            None => Err(StoreError::EngineClosed(name.to_string())),
        }
    }

    /// Stop every store and empty the registry.
    ///
    /// Every store is attempted; the first error is returned.
    pub fn shutdown(&self) -> Result<()> {
        let drained: Vec<_> = self.stores.write().drain().collect();
        let mut first_error = None;

        for (name, store) in drained {
            if let Err(e) = store.stop() {
                tracing::warn!(store = %name, error = %e, "Failed to stop store during shutdown");
                first_error.get_or_insert(e);
            }
        }

        tracing::info!("Registry shut down");
        first_error.map_or(Ok(()), Err)
    }
}

impl<K: StoreKey, V: StoreValue> Default for Registry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
