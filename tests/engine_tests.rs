//! Engine Integration Tests
//!
//! Tests verify:
//! - Basic put/get/delete through WAL, memtable and SSTables
//! - Automatic flush when the memtable fills
//! - Crash recovery from the WAL, including torn batches
//! - Ordered scans that honor tombstones
//! - create_if_missing / error_if_exists
//! - Concurrent writers

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use atlasstore::config::EngineConfig;
use atlasstore::engine::Engine;
use atlasstore::wal::Operation;
use atlasstore::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, PathBuf, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("db");
    let engine = Engine::open_path(&path).unwrap();
    (temp_dir, path, engine)
}

fn small_memtable_config(path: &Path) -> EngineConfig {
    EngineConfig::builder()
        .data_dir(path)
        .memtable_size_limit(64)
        .build()
}

fn put_op(key: &str, value: &str) -> Operation {
    Operation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_put_get_delete() {
    let (_temp, _path, engine) = setup_temp_engine();

    engine.put(b"name", b"atlas").unwrap();
    assert_eq!(engine.get(b"name").unwrap(), Some(b"atlas".to_vec()));

    engine.delete(b"name").unwrap();
    assert_eq!(engine.get(b"name").unwrap(), None);

    // Absent keys delete cleanly
    engine.delete(b"never-written").unwrap();
}

#[test]
fn test_tombstone_shadows_flushed_value() {
    let (_temp, _path, engine) = setup_temp_engine();

    engine.put(b"k", b"v").unwrap();
    engine.flush().unwrap();
    engine.delete(b"k").unwrap();

    assert_eq!(engine.get(b"k").unwrap(), None);
    assert!(engine.scan().unwrap().is_empty());
}

#[test]
fn test_automatic_flush_on_memtable_limit() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");
    let engine = Engine::open(small_memtable_config(&path)).unwrap();

    for i in 0..20 {
        engine
            .put(format!("key{:02}", i).as_bytes(), b"0123456789")
            .unwrap();
    }

    assert!(engine.sstable_count() > 0);
    for i in 0..20 {
        assert_eq!(
            engine.get(format!("key{:02}", i).as_bytes()).unwrap(),
            Some(b"0123456789".to_vec())
        );
    }
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_recovery_replays_wal_after_crash() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");

    {
        let engine = Engine::open_path(&path).unwrap();
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.delete(b"a").unwrap();
        // Dropped without close: memtable contents only live in the WAL
    }

    let engine = Engine::open_path(&path).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), None);
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(fs::metadata(path.join("wal.log")).unwrap().len(), 0);
}

#[test]
fn test_close_then_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");

    let engine = Engine::open_path(&path).unwrap();
    engine.put(b"persist", b"me").unwrap();
    engine.close().unwrap();

    let engine = Engine::open_path(&path).unwrap();
    assert_eq!(engine.get(b"persist").unwrap(), Some(b"me".to_vec()));
}

#[test]
fn test_torn_batch_is_dropped_entirely() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");

    {
        let engine = Engine::open_path(&path).unwrap();
        engine.put(b"before", b"kept").unwrap();
        engine
            .write_batch(vec![put_op("b1", "x"), put_op("b2", "y")])
            .unwrap();
    }

    let wal_path = path.join("wal.log");
    let len = fs::metadata(&wal_path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&wal_path)
        .unwrap()
        .set_len(len - 3)
        .unwrap();

    let engine = Engine::open_path(&path).unwrap();
    assert_eq!(engine.get(b"before").unwrap(), Some(b"kept".to_vec()));
    assert_eq!(engine.get(b"b1").unwrap(), None);
    assert_eq!(engine.get(b"b2").unwrap(), None);
}

#[test]
fn test_recovery_survives_oversized_wal_length() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");
    {
        let engine = Engine::open_path(&path).unwrap();
        engine.put(b"a", b"1").unwrap();
    }

    // Torn header claiming 4 GiB of data
    let mut header = Vec::new();
    header.extend_from_slice(&2u64.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&u32::MAX.to_le_bytes());
    let mut wal = OpenOptions::new().append(true).open(path.join("wal.log")).unwrap();
    wal.write_all(&header).unwrap();
    drop(wal);

    let engine = Engine::open_path(&path).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
}

// =============================================================================
// Flush Failures
// =============================================================================

/// Replace the SSTable directory with a plain file so the next flush fails
fn block_sstable_dir(path: &Path) {
    let sstables = path.join("sstables");
    fs::remove_dir_all(&sstables).unwrap();
    fs::write(&sstables, b"in the way").unwrap();
}

fn unblock_sstable_dir(path: &Path) {
    let sstables = path.join("sstables");
    fs::remove_file(&sstables).unwrap();
    fs::create_dir_all(&sstables).unwrap();
}

#[test]
fn test_failed_flush_does_not_fail_committed_write() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");
    let config = EngineConfig::builder()
        .data_dir(&path)
        .memtable_size_limit(1)
        .build();
    let engine = Engine::open(config).unwrap();

    engine.put(b"a", b"1").unwrap();
    assert_eq!(engine.sstable_count(), 1);

    block_sstable_dir(&path);
    engine.put(b"a", b"11").unwrap();

    assert_eq!(engine.get(b"a").unwrap(), Some(b"11".to_vec()));
    assert_eq!(engine.memtable_entry_count(), 1);
    assert!(engine.flush().is_err());

    // The next write retries the flush once the directory is back
    unblock_sstable_dir(&path);
    engine.put(b"b", b"2").unwrap();
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.get(b"a").unwrap(), Some(b"11".to_vec()));
}

#[test]
fn test_write_kept_by_failed_flush_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");
    let config = EngineConfig::builder()
        .data_dir(&path)
        .memtable_size_limit(1)
        .build();

    {
        let engine = Engine::open(config.clone()).unwrap();
        engine.put(b"a", b"1").unwrap();
        block_sstable_dir(&path);
        engine.put(b"a", b"2").unwrap();
    }

    unblock_sstable_dir(&path);
    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"2".to_vec()));
}

// =============================================================================
// Batches and Scans
// =============================================================================

#[test]
fn test_write_batch_last_write_wins() {
    let (_temp, _path, engine) = setup_temp_engine();

    engine
        .write_batch(vec![
            put_op("k", "first"),
            put_op("other", "o"),
            put_op("k", "second"),
            Operation::Delete { key: b"other".to_vec() },
        ])
        .unwrap();

    assert_eq!(engine.get(b"k").unwrap(), Some(b"second".to_vec()));
    assert_eq!(engine.get(b"other").unwrap(), None);
}

#[test]
fn test_nested_batch_rejected() {
    let (_temp, _path, engine) = setup_temp_engine();

    let nested = Operation::Batch { ops: vec![put_op("a", "1")] };
    assert!(matches!(
        engine.write_batch(vec![nested]),
        Err(StoreError::Storage(_))
    ));
    engine.write_batch(Vec::new()).unwrap();
}

#[test]
fn test_scan_merges_layers_in_key_order() {
    let (_temp, _path, engine) = setup_temp_engine();

    engine.put(b"c", b"3").unwrap();
    engine.put(b"a", b"old").unwrap();
    engine.flush().unwrap();
    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.flush().unwrap();
    engine.delete(b"c").unwrap();
    engine.put(b"d", b"4").unwrap();

    let entries = engine.scan().unwrap();
    assert_eq!(
        entries,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"d".to_vec(), b"4".to_vec()),
        ]
    );
    assert_eq!(
        engine.scan_keys().unwrap(),
        vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec()]
    );
}

#[test]
fn test_compact_preserves_live_data() {
    let (_temp, _path, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.flush().unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.flush().unwrap();
    engine.delete(b"a").unwrap();

    engine.compact().unwrap();

    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.scan().unwrap(), vec![(b"b".to_vec(), b"2".to_vec())]);
}

#[test]
fn test_stats_report_sstables() {
    let (_temp, _path, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.flush().unwrap();
    engine.put(b"b", b"2").unwrap();

    let stats = engine.stats();
    assert_eq!(stats.sstables.len(), 1);
    assert_eq!(stats.memtable_entries, 1);
    assert!(stats.last_lsn >= 1);
    assert!(stats.to_string().contains("SSTables"));
}

// =============================================================================
// Open Flags
// =============================================================================

#[test]
fn test_create_if_missing_false_fails_on_new_dir() {
    let temp = TempDir::new().unwrap();
    let config = EngineConfig::builder()
        .data_dir(temp.path().join("absent"))
        .create_if_missing(false)
        .build();

    assert!(matches!(Engine::open(config), Err(StoreError::Storage(_))));
    assert!(!temp.path().join("absent").exists());
}

#[test]
fn test_error_if_exists_refuses_populated_dir() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");

    let engine = Engine::open_path(&path).unwrap();
    engine.put(b"k", b"v").unwrap();
    engine.close().unwrap();

    let config = EngineConfig::builder()
        .data_dir(&path)
        .error_if_exists(true)
        .build();
    assert!(matches!(Engine::open(config), Err(StoreError::Storage(_))));
}

#[test]
fn test_error_if_exists_accepts_fresh_dir() {
    let temp = TempDir::new().unwrap();
    let config = EngineConfig::builder()
        .data_dir(temp.path().join("fresh"))
        .error_if_exists(true)
        .build();

    assert!(Engine::open(config).is_ok());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");
    let engine = Arc::new(Engine::open(small_memtable_config(&path)).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("t{}-{:02}", t, i);
                    engine.put(key.as_bytes(), key.as_bytes()).unwrap();
                    assert_eq!(engine.get(key.as_bytes()).unwrap(), Some(key.into_bytes()));
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(engine.scan_keys().unwrap().len(), 200);
}
