//! Volatile backend: an ordered in-process table.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::config::{BackendKind, Options};
use crate::error::{Result, StoreError};

use super::{Backend, EntryIter, KeyIter, StoreKey, StoreValue};

/// In-process table; contents live exactly as long as the adapter
pub struct VolatileBackend<K, V> {
    name: String,
    table: RwLock<BTreeMap<K, V>>,
}

impl<K: StoreKey, V: StoreValue> VolatileBackend<K, V> {
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl<K: StoreKey, V: StoreValue> Backend<K, V> for VolatileBackend<K, V> {
    fn start(name: &str, options: &Options) -> Result<Self> {
        options.validate()?;
        tracing::debug!(store = name, "Started volatile backend");
        Ok(Self {
            name: name.to_string(),
            table: RwLock::new(BTreeMap::new()),
        })
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Volatile
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stop(self: Box<Self>) -> Result<()> {
        tracing::debug!(store = %self.name, "Stopped volatile backend");
        Ok(())
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        self.table.write().clear();
        tracing::debug!(store = %self.name, "Destroyed volatile backend");
        Ok(())
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        self.table.write().insert(key.clone(), value.clone());
        Ok(())
    }

    fn get(&self, key: &K) -> Result<V> {
        self.table.read().get(key).cloned().ok_or(StoreError::NotFound)
    }

    fn delete(&self, key: &K) -> Result<()> {
        self.table.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, entries: Vec<(K, V)>) -> Result<()> {
        let mut table = self.table.write();
        for (key, value) in entries {
            table.insert(key, value);
        }
        Ok(())
    }

    fn entries(&self) -> Result<EntryIter<'_, K, V>> {
        let snapshot: Vec<(K, V)> = self
            .table
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn keys(&self) -> Result<KeyIter<'_, K>> {
        let snapshot: Vec<K> = self.table.read().keys().cloned().collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }
}
