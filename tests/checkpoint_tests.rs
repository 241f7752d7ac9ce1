//! Checkpoint Tests
//!
//! Tests verify:
//! - Archive naming and location
//! - Round trip into a distinct store name
//! - The checkpointed store keeps working afterwards
//! - Restore sources (archive file or directory)
//! - Failure modes leave existing state alone
//! - Operations during the checkpoint window fail with `EngineClosed`

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use atlasstore::backend::{Backend, BackendFactory, PersistentBackend};
use atlasstore::checkpoint::checkpoint_name;
use atlasstore::{BackendKind, Options, Store, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store(name: &str) -> (TempDir, Options, Store<String, u64>) {
    let temp_dir = TempDir::new().unwrap();
    let options = Options::builder().db_dir(temp_dir.path().join("db")).build();
    let store = Store::open(name, BackendKind::Persistent, options.clone()).unwrap();
    (temp_dir, options, store)
}

fn s(value: &str) -> String {
    value.to_string()
}

/// Persistent factory whose second call (the checkpoint restart) runs
/// `on_restart` first
fn restart_hook_factory<F>(on_restart: F) -> BackendFactory<String, u64>
where
    F: Fn() -> atlasstore::Result<()> + Send + Sync + 'static,
{
    let starts = AtomicUsize::new(0);
    let factory: BackendFactory<String, u64> = Arc::new(move |name: &str, options: &Options| {
        if starts.fetch_add(1, Ordering::SeqCst) == 1 {
            on_restart()?;
        }
        Ok(Box::new(PersistentBackend::<String, u64>::start(name, options)?) as Box<dyn Backend<String, u64>>)
    });
    factory
}

// =============================================================================
// Checkpoint
// =============================================================================

#[test]
fn test_checkpoint_writes_named_archive() {
    let (temp, _options, store) = setup_temp_store("orders");
    store.put(&s("a"), &1).unwrap();

    let dest = temp.path().join("backups");
    let archive = store.checkpoint(&dest).unwrap();

    assert_eq!(archive, dest.join("orders.tar.gz"));
    assert_eq!(checkpoint_name("orders"), "orders.tar.gz");
    assert!(archive.is_file());
    assert!(fs::metadata(&archive).unwrap().len() > 0);
}

#[test]
fn test_store_usable_after_checkpoint() {
    let (temp, _options, store) = setup_temp_store("orders");
    store.put(&s("a"), &1).unwrap();

    store.checkpoint(&temp.path().join("backups")).unwrap();

    assert!(store.is_open());
    assert_eq!(store.get(&s("a")).unwrap(), 1);
    store.put(&s("b"), &2).unwrap();
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn test_checkpoint_round_trip_into_distinct_name() {
    let (temp, options, store) = setup_temp_store("orig");
    store
        .from_list((1..=10).map(|i| (format!("k{}", i), i)).collect())
        .unwrap();
    let before = store.to_list().unwrap();

    let archive = store.checkpoint(&temp.path().join("backups")).unwrap();

    // Writes after the checkpoint must not show up in the restored copy
    store.put(&s("late"), &99).unwrap();
    store.delete(&s("k1")).unwrap();

    let copy: Store<String, u64> = Store::from_checkpoint("copy", options, &archive).unwrap();

    assert_eq!(copy.to_list().unwrap(), before);
    assert!(copy.get(&s("late")).unwrap_err().is_not_found());
    assert!(store.get(&s("k1")).unwrap_err().is_not_found());
}

#[test]
fn test_restore_from_directory_source() {
    let (temp, options, store) = setup_temp_store("orders");
    store.put(&s("a"), &1).unwrap();
    let backups = temp.path().join("backups");
    store.checkpoint(&backups).unwrap();

    store.put(&s("a"), &2).unwrap();
    store.stop().unwrap();

    let restored: Store<String, u64> = Store::from_checkpoint("orders", options, &backups).unwrap();
    assert_eq!(restored.get(&s("a")).unwrap(), 1);
}

#[test]
fn test_restore_replaces_stale_state() {
    let (temp, options, store) = setup_temp_store("orig");
    store.put(&s("fresh"), &1).unwrap();
    let archive = store.checkpoint(&temp.path().join("backups")).unwrap();

    {
        let target: Store<String, u64> =
            Store::open("target", BackendKind::Persistent, options.clone()).unwrap();
        target.put(&s("stale"), &7).unwrap();
        target.stop().unwrap();
    }

    let target: Store<String, u64> = Store::from_checkpoint("target", options, &archive).unwrap();

    assert_eq!(target.keys().unwrap(), vec![s("fresh")]);
}

// =============================================================================
// Failure Modes
// =============================================================================

#[test]
fn test_missing_archive_is_io_error_and_target_untouched() {
    let (temp, options, store) = setup_temp_store("orders");
    store.put(&s("keep"), &1).unwrap();
    store.stop().unwrap();

    let result: atlasstore::Result<Store<String, u64>> =
        Store::from_checkpoint("orders", options.clone(), &temp.path().join("nowhere.tar.gz"));
    assert!(matches!(result, Err(StoreError::Io(_))));

    store.start().unwrap();
    assert_eq!(store.get(&s("keep")).unwrap(), 1);
}

#[test]
fn test_directory_without_matching_archive_is_io_error() {
    let (temp, options, store) = setup_temp_store("orders");
    let backups = temp.path().join("backups");
    store.checkpoint(&backups).unwrap();

    let result: atlasstore::Result<Store<String, u64>> =
        Store::from_checkpoint("other", options, &backups);

    assert!(matches!(result, Err(StoreError::Io(_))));
}

#[test]
fn test_volatile_checkpoint_is_config_error() {
    let temp = TempDir::new().unwrap();
    let options = Options::builder().db_dir(temp.path()).build();
    let store: Store<String, u64> = Store::open("mem", BackendKind::Volatile, options).unwrap();
    store.put(&s("a"), &1).unwrap();

    let result = store.checkpoint(&temp.path().join("backups"));

    assert!(matches!(result, Err(StoreError::Config(_))));
    assert_eq!(store.get(&s("a")).unwrap(), 1);
}

#[test]
fn test_checkpoint_of_stopped_store_is_engine_closed() {
    let (temp, _options, store) = setup_temp_store("orders");
    store.stop().unwrap();

    let result = store.checkpoint(&temp.path().join("backups"));

    assert!(matches!(result, Err(StoreError::EngineClosed(_))));
    assert!(!temp.path().join("backups").exists());
}

// =============================================================================
// Checkpoint Window
// =============================================================================

#[test]
fn test_store_is_closed_while_checkpoint_runs() {
    let temp = TempDir::new().unwrap();
    let options = Options::builder().db_dir(temp.path().join("db")).build();
    let gate = Arc::new(Barrier::new(2));

    let hook_gate = Arc::clone(&gate);
    let factory = restart_hook_factory(move || {
        hook_gate.wait();
        hook_gate.wait();
        Ok(())
    });
    let store = Arc::new(
        Store::with_factory("orders", BackendKind::Persistent, options, factory).unwrap(),
    );
    store.put(&s("a"), &1).unwrap();

    let dest = temp.path().join("backups");
    let checkpointing = {
        let store = Arc::clone(&store);
        let dest = dest.clone();
        thread::spawn(move || store.checkpoint(&dest))
    };

    // The archive is written and the restart is held open
    gate.wait();
    let get = store.get(&s("a"));
    let put = store.put(&s("b"), &2);
    let stop = store.stop();
    let start = store.start();
    let destroy = store.destroy();
    let open = store.is_open();
    gate.wait();

    let archive = checkpointing.join().unwrap().unwrap();

    assert!(matches!(get, Err(StoreError::EngineClosed(_))));
    assert!(matches!(put, Err(StoreError::EngineClosed(_))));
    assert!(matches!(stop, Err(StoreError::EngineClosed(_))));
    assert!(matches!(start, Err(StoreError::EngineClosed(_))));
    assert!(matches!(destroy, Err(StoreError::EngineClosed(_))));
    assert!(!open);

    assert!(archive.is_file());
    assert!(store.is_open());
    assert_eq!(store.get(&s("a")).unwrap(), 1);
    assert!(store.get(&s("b")).unwrap_err().is_not_found());
}

#[test]
fn test_failed_restart_leaves_store_closed() {
    let temp = TempDir::new().unwrap();
    let options = Options::builder().db_dir(temp.path().join("db")).build();
    let factory = restart_hook_factory(|| Err(StoreError::engine_open("orders", "restart refused")));
    let store = Store::with_factory("orders", BackendKind::Persistent, options, factory).unwrap();
    store.put(&s("a"), &1).unwrap();

    // Archiving fails as well: the destination is a file
    let dest = temp.path().join("not_a_dir");
    fs::write(&dest, b"file").unwrap();

    let result = store.checkpoint(&dest.join("backups"));

    assert!(matches!(result, Err(StoreError::EngineOpen { .. })));
    assert!(!store.is_open());
    assert!(matches!(store.get(&s("a")), Err(StoreError::EngineClosed(_))));

    store.start().unwrap();
    assert_eq!(store.get(&s("a")).unwrap(), 1);
}
