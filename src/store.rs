//! Store Module
//!
//! A [`Store`] binds a logical name to one started backend and routes every
//! operation to it. The store owns nothing else: no cache, no lock beyond
//! the one guarding the backend slot.
//!
//! ## Lifecycle
//! ```text
//!   open ──► [open] ──stop──► [stopped] ──start──► [open]
//!              │                  │
//!              └────destroy───────┴──► [destroyed]
//! ```
//! Operations on a stopped or destroyed store fail with `EngineClosed`.
//! While a checkpoint runs, every operation fails with `EngineClosed`, and so
//! do `start`, `stop` and `destroy`.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::backend::{self, Backend, BackendFactory, StoreKey, StoreValue};
use crate::checkpoint;
use crate::config::{BackendKind, Options};
use crate::error::{Result, StoreError};

/// A named key-value store bound to one backend
pub struct Store<K, V> {
    name: String,
    kind: BackendKind,
    options: Options,
    factory: BackendFactory<K, V>,
    backend: RwLock<Slot<K, V>>,
}

/// What currently occupies a store's backend slot
enum Slot<K, V> {
    Open(Box<dyn Backend<K, V>>),
    /// Stopped or destroyed
    Closed,
    /// A checkpoint owns the backend and will reopen it
    Checkpointing,
}

impl<K: StoreKey, V: StoreValue> Store<K, V> {
    /// Open a store on the built-in backend of `kind`
    pub fn open(name: &str, kind: BackendKind, options: Options) -> Result<Self> {
        Self::with_factory(name, kind, options, backend::factory(kind))
    }

    /// Open a store whose backend is built by `factory`.
    ///
    /// The factory is kept and reused whenever the store restarts.
    pub fn with_factory(
        name: &str,
        kind: BackendKind,
        options: Options,
        factory: BackendFactory<K, V>,
    ) -> Result<Self> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StoreError::Config(format!("invalid store name '{}'", name)));
        }
        options.validate()?;

        let started = factory(name, &options)?;
        tracing::info!(store = name, backend = %kind, "Opened store");

        Ok(Self {
            name: name.to_string(),
            kind,
            options,
            factory,
            backend: RwLock::new(Slot::Open(started)),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop the backend, keeping persisted state. Stopping a stopped store
    /// is a no-op.
    pub fn stop(&self) -> Result<()> {
        let backend = {
            let mut slot = self.backend.write();
            match std::mem::replace(&mut *slot, Slot::Closed) {
                Slot::Open(backend) => backend,
                Slot::Closed => return Ok(()),
                Slot::Checkpointing => {
                    *slot = Slot::Checkpointing;
                    return Err(self.closed());
                }
            }
        };
        backend.stop()?;
        tracing::info!(store = %self.name, "Stopped store");
        Ok(())
    }

    /// Restart a stopped store with its original options
    pub fn start(&self) -> Result<()> {
        let mut slot = self.backend.write();
        match *slot {
            Slot::Open(_) => Ok(()),
            Slot::Checkpointing => Err(self.closed()),
            Slot::Closed => {
                *slot = Slot::Open((self.factory)(&self.name, &self.options)?);
                tracing::info!(store = %self.name, "Started store");
                Ok(())
            }
        }
    }

    /// Remove every persisted trace of this store. Works on open and
    /// stopped stores; the store stays closed afterwards.
    pub fn destroy(&self) -> Result<()> {
        let open = {
            let mut slot = self.backend.write();
            match std::mem::replace(&mut *slot, Slot::Closed) {
                Slot::Open(backend) => Some(backend),
                Slot::Closed => None,
                Slot::Checkpointing => {
                    *slot = Slot::Checkpointing;
                    return Err(self.closed());
                }
            }
        };
        match open {
            Some(backend) => backend.destroy()?,
            None => backend::purge(self.kind, &self.name, &self.options)?,
        }
        tracing::info!(store = %self.name, "Destroyed store");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.backend.read(), Slot::Open(_))
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Insert or overwrite
    pub fn put(&self, key: &K, value: &V) -> Result<()> {
        self.with_backend(|b| b.put(key, value))
    }

    /// Value for `key`, or `Err(StoreError::NotFound)`
    pub fn get(&self, key: &K) -> Result<V> {
        self.with_backend(|b| b.get(key))
    }

    /// `Ok(None)` instead of `NotFound`
    pub fn lookup(&self, key: &K) -> Result<Option<V>> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove `key`; absent keys are fine
    pub fn delete(&self, key: &K) -> Result<()> {
        self.with_backend(|b| b.delete(key))
    }

    // =========================================================================
    // Read-Modify-Write
    // =========================================================================

    /// Store `f(key, current)`, where `current` is `None` when absent.
    ///
    /// This is a plain get followed by a put, with `f` running between them
    /// and no lock held. Two concurrent updates of the same key can both
    /// read the same old value, and one of the results is lost. A failing
    /// get leaves the store untouched; a failing put leaves the old value.
    pub fn update<F>(&self, key: &K, f: F) -> Result<V>
    where
        F: FnOnce(&K, Option<V>) -> V,
    {
        let current = self.lookup(key)?;
        let next = f(key, current);
        self.put(key, &next)?;
        Ok(next)
    }

    /// Store `f(key, current, value)`, merging a caller value with whatever
    /// is stored (e.g. accumulate-or-initialize).
    ///
    /// Same race as [`Store::update`].
    pub fn update_value<F>(&self, key: &K, value: V, f: F) -> Result<V>
    where
        F: FnOnce(&K, Option<V>, V) -> V,
    {
        let current = self.lookup(key)?;
        let next = f(key, current, value);
        self.put(key, &next)?;
        Ok(next)
    }

    // =========================================================================
    // Folds
    // =========================================================================

    /// Thread `acc` through every entry in the backend's key order.
    ///
    /// Weakly consistent with concurrent writers.
    pub fn fold<A, F>(&self, init: A, mut f: F) -> Result<A>
    where
        F: FnMut(A, K, V) -> A,
    {
        self.with_backend(|b| {
            b.entries()?
                .try_fold(init, |acc, entry| entry.map(|(k, v)| f(acc, k, v)))
        })
    }

    /// Like [`Store::fold`] without decoding values
    pub fn fold_keys<A, F>(&self, init: A, mut f: F) -> Result<A>
    where
        F: FnMut(A, K) -> A,
    {
        self.with_backend(|b| {
            b.keys()?
                .try_fold(init, |acc, key| key.map(|k| f(acc, k)))
        })
    }

    /// Every entry, in key order
    pub fn to_list(&self) -> Result<Vec<(K, V)>> {
        self.fold(Vec::new(), |mut list, k, v| {
            list.push((k, v));
            list
        })
    }

    /// Every key, in key order
    pub fn keys(&self) -> Result<Vec<K>> {
        self.fold_keys(Vec::new(), |mut keys, k| {
            keys.push(k);
            keys
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.fold_keys(0, |n, _| n + 1)
    }

    /// Write `entries` as one batch; for duplicate keys the last one wins.
    ///
    /// On the persistent backend the batch is all-or-nothing.
    pub fn from_list(&self, entries: Vec<(K, V)>) -> Result<()> {
        self.with_backend(|b| b.write_batch(entries))
    }

    // =========================================================================
    // Checkpoint / Status
    // =========================================================================

    /// Archive this store to `dest_dir/<name>.tar.gz`, restarting it in
    /// place. Returns the archive path.
    ///
    /// The store is closed while the archive is written.
    pub fn checkpoint(&self, dest_dir: &Path) -> Result<PathBuf> {
        checkpoint::checkpoint(self, dest_dir)
    }

    /// Replace the on-disk state of `name` with an archive and open it.
    ///
    /// `source` is either the archive file or a directory holding
    /// `<name>.tar.gz`.
    pub fn from_checkpoint(name: &str, options: Options, source: &Path) -> Result<Self> {
        checkpoint::from_checkpoint(name, options, source)
    }

    /// Engine-reported internals; `None` for the volatile backend
    pub fn status(&self) -> Result<Option<String>> {
        self.with_backend(|b| Ok(b.status()))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    // =========================================================================
    // Crate-internal backend slot access (checkpointing)
    // =========================================================================

    /// Hand the open backend to a checkpoint, leaving the slot marked so
    /// that nothing else can start, stop or use the store meanwhile
    pub(crate) fn begin_checkpoint(&self) -> Result<Box<dyn Backend<K, V>>> {
        let mut slot = self.backend.write();
        match std::mem::replace(&mut *slot, Slot::Checkpointing) {
            Slot::Open(backend) => Ok(backend),
            other => {
                *slot = other;
                Err(self.closed())
            }
        }
    }

    /// Reopen the backend a checkpoint stopped. On failure the store is
    /// left closed.
    pub(crate) fn finish_checkpoint(&self) -> Result<()> {
        let started = (self.factory)(&self.name, &self.options);
        let mut slot = self.backend.write();
        match started {
            Ok(backend) => {
                *slot = Slot::Open(backend);
                Ok(())
            }
            Err(e) => {
                *slot = Slot::Closed;
                Err(e)
            }
        }
    }

    fn with_backend<T>(&self, op: impl FnOnce(&dyn Backend<K, V>) -> Result<T>) -> Result<T> {
        match &*self.backend.read() {
            Slot::Open(backend) => op(&**backend),
            Slot::Closed | Slot::Checkpointing => Err(self.closed()),
        }
    }

    fn closed(&self) -> StoreError {
        StoreError::EngineClosed(self.name.clone())
    }
}

impl<K, V> fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("open", &matches!(*self.backend.read(), Slot::Open(_)))
            .finish()
    }
}
