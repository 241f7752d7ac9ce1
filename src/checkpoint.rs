//! Checkpoint Module
//!
//! Point-in-time snapshots of a persistent store. The LSM engine has no
//! live-snapshot primitive, so a checkpoint stops the store, archives its
//! directory, and restarts it.
//!
//! ## Archive Format
//! A gzip-compressed tar named `<store-name>.tar.gz`. Entries are relative
//! to the store directory (`wal.log`, `sstables/...`), so an archive can be
//! restored under any store name.
//!
//! ## Checkpoint
//! ```text
//!   take backend ──► stop ──► tar+gzip store dir ──► start ──► install
//!        │                                                       │
//!        └───────── operations fail with EngineClosed ───────────┘
//! ```
//!
//! Neither operation is atomic on the filesystem: a failed checkpoint can
//! leave a partial archive, and a failed restore a partially extracted
//! directory that must not be used.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::backend::{StoreKey, StoreValue};
use crate::config::{BackendKind, Options};
use crate::error::{Result, StoreError};
use crate::store::Store;

/// Archive file name for a store
pub fn checkpoint_name(name: &str) -> String {
    format!("{}.tar.gz", name)
}

/// Stop `store`, archive its directory into `dest_dir`, restart it.
///
/// The store is restarted even when archiving fails; the archiving error is
/// returned after the restart. If the restart fails the store is left
/// closed and the restart error is returned. Returns the archive path.
pub fn checkpoint<K: StoreKey, V: StoreValue>(store: &Store<K, V>, dest_dir: &Path) -> Result<PathBuf> {
    if store.kind() != BackendKind::Persistent {
        return Err(StoreError::Config(format!(
            "store '{}' uses the {} backend; only persistent stores can be checkpointed",
            store.name(),
            store.kind()
        )));
    }

    let backend = store.begin_checkpoint()?;

    tracing::info!(store = store.name(), dest = %dest_dir.display(), "Checkpoint started");

    if let Err(e) = backend.stop() {
        store.finish_checkpoint()?;
        return Err(e);
    }

    let archive_path = dest_dir.join(checkpoint_name(store.name()));
    let archived = archive_dir(&store.options().store_dir(store.name()), &archive_path);

    if let Err(e) = store.finish_checkpoint() {
        if let Err(archive_err) = &archived {
            tracing::error!(
                store = store.name(),
                archive = %archive_path.display(),
                error = %archive_err,
                "Checkpoint archive failed"
            );
        }
        tracing::error!(store = store.name(), error = %e, "Store did not restart after checkpoint");
        return Err(e);
    }
    archived?;

    tracing::info!(
        store = store.name(),
        archive = %archive_path.display(),
        "Checkpoint written"
    );

    Ok(archive_path)
}

/// Replace the on-disk state of `name` with the archive at `source` and
/// open the result as a persistent store.
///
/// `source` may be the archive itself or a directory containing
/// `<name>.tar.gz`. The archive is located before anything is removed.
pub fn from_checkpoint<K: StoreKey, V: StoreValue>(
    name: &str,
    options: Options,
    source: &Path,
) -> Result<Store<K, V>> {
    let archive_path = if source.is_dir() {
        source.join(checkpoint_name(name))
    } else {
        source.to_path_buf()
    };

    if !archive_path.is_file() {
        return Err(StoreError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("checkpoint archive {} not found", archive_path.display()),
        )));
    }

    let target = options.store_dir(name);
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    fs::create_dir_all(&target)?;

    extract_archive(&archive_path, &target)?;

    tracing::info!(
        store = name,
        archive = %archive_path.display(),
        dir = %target.display(),
        "Restored checkpoint"
    );

    Store::open(name, BackendKind::Persistent, options)
}

/// Write `src_dir`'s tree into a gzip tar at `archive_path`
pub fn archive_dir(src_dir: &Path, archive_path: &Path) -> Result<()> {
    if !src_dir.is_dir() {
        return Err(StoreError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("store directory {} not found", src_dir.display()),
        )));
    }
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", src_dir)?;

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?
        .sync_all()?;

    Ok(())
}

/// Unpack a gzip tar into `target_dir`
///
/// Entries that would land outside `target_dir` are skipped by the tar
/// reader.
pub fn extract_archive(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(false);
    archive.unpack(target_dir)?;
    Ok(())
}
