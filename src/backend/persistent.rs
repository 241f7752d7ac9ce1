//! Persistent backend: codec in front of the LSM engine.
//!
//! Keys and values are encoded by the codec, so fold order is the
//! lexicographic order of encoded key bytes.

use std::fs;
use std::path::PathBuf;

use crate::codec::{BincodeCodec, Codec};
use crate::config::{BackendKind, Options};
use crate::engine::Engine;
use crate::error::{Result, StoreError};
use crate::wal::Operation;

use super::{Backend, EntryIter, KeyIter, StoreKey, StoreValue};

/// LSM-backed adapter; one on-disk directory per store name
pub struct PersistentBackend<K, V> {
    name: String,
    dir: PathBuf,
    engine: Engine,
    key_codec: Box<dyn Codec<K>>,
    value_codec: Box<dyn Codec<V>>,
}

impl<K: StoreKey, V: StoreValue> PersistentBackend<K, V> {
    /// Start with caller-supplied codecs instead of the bincode default
    pub fn with_codecs(
        name: &str,
        options: &Options,
        key_codec: Box<dyn Codec<K>>,
        value_codec: Box<dyn Codec<V>>,
    ) -> Result<Self> {
        options.validate()?;
        let config = options.engine_config(name);
        let dir = config.data_dir.clone();

        let engine = Engine::open(config).map_err(|e| StoreError::engine_open(name, e))?;

        tracing::info!(
            store = name,
            dir = %dir.display(),
            sstables = engine.sstable_count(),
            "Started persistent backend"
        );

        Ok(Self {
            name: name.to_string(),
            dir,
            engine,
            key_codec,
            value_codec,
        })
    }

    /// The underlying engine, for flush/compaction control
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn decode_entry(&self, key: &[u8], value: &[u8]) -> Result<(K, V)> {
        Ok((self.key_codec.decode(key)?, self.value_codec.decode(value)?))
    }
}

impl<K: StoreKey, V: StoreValue> Backend<K, V> for PersistentBackend<K, V> {
    fn start(name: &str, options: &Options) -> Result<Self> {
        Self::with_codecs(
            name,
            options,
            Box::new(BincodeCodec::<K>::new()),
            Box::new(BincodeCodec::<V>::new()),
        )
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Persistent
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stop(self: Box<Self>) -> Result<()> {
        let PersistentBackend { name, engine, .. } = *self;
        engine.close().map_err(StoreError::into_write)?;
        tracing::info!(store = %name, "Stopped persistent backend");
        Ok(())
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        let PersistentBackend {
            name, dir, engine, ..
        } = *self;
        drop(engine);

        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        tracing::info!(store = %name, dir = %dir.display(), "Destroyed persistent backend");
        Ok(())
    }

    fn put(&self, key: &K, value: &V) -> Result<()> {
        let key = self.key_codec.encode(key)?;
        let value = self.value_codec.encode(value)?;
        self.engine.put(&key, &value).map_err(StoreError::into_write)
    }

    fn get(&self, key: &K) -> Result<V> {
        let key = self.key_codec.encode(key)?;
        match self.engine.get(&key).map_err(StoreError::into_read)? {
            Some(bytes) => self.value_codec.decode(&bytes),
            None => Err(StoreError::NotFound),
        }
    }

    fn delete(&self, key: &K) -> Result<()> {
        let key = self.key_codec.encode(key)?;
        self.engine.delete(&key).map_err(StoreError::into_write)
    }

    fn write_batch(&self, entries: Vec<(K, V)>) -> Result<()> {
        // Encode everything first so a codec failure writes nothing
        let ops = entries
            .iter()
            .map(|(k, v)| {
                Ok(Operation::Put {
                    key: self.key_codec.encode(k)?,
                    value: self.value_codec.encode(v)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.engine.write_batch(ops).map_err(StoreError::into_write)
    }

    fn entries(&self) -> Result<EntryIter<'_, K, V>> {
        let raw = self.engine.scan().map_err(StoreError::into_read)?;
        Ok(Box::new(
            raw.into_iter().map(move |(k, v)| self.decode_entry(&k, &v)),
        ))
    }

    fn keys(&self) -> Result<KeyIter<'_, K>> {
        let raw = self.engine.scan_keys().map_err(StoreError::into_read)?;
        Ok(Box::new(
            raw.into_iter().map(move |k| self.key_codec.decode(&k)),
        ))
    }

    fn status(&self) -> Option<String> {
        Some(self.engine.stats().to_string())
    }
}
