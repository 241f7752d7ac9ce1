//! Concurrency Tests
//!
//! `update` is a plain read followed by a write. These tests pin down the
//! consequences: concurrent updates of one key can lose increments, while
//! plain puts from many threads all land.

use std::sync::{Arc, Barrier};
use std::thread;

use atlasstore::{BackendKind, Options, Store};
use tempfile::TempDir;

const KINDS: [BackendKind; 2] = [BackendKind::Volatile, BackendKind::Persistent];

fn setup_temp_store(kind: BackendKind) -> (TempDir, Arc<Store<String, u64>>) {
    let temp_dir = TempDir::new().unwrap();
    let options = Options::builder().db_dir(temp_dir.path()).build();
    let store = Store::open("shared", kind, options).unwrap();
    (temp_dir, Arc::new(store))
}

#[test]
fn test_concurrent_updates_can_lose_an_increment() {
    for kind in KINDS {
        let (_temp, store) = setup_temp_store(kind);
        let key = "counter".to_string();
        store.put(&key, &0).unwrap();

        // Both threads read the old value before either writes
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let key = key.clone();
                thread::spawn(move || {
                    store
                        .update(&key, |_, current| {
                            barrier.wait();
                            current.unwrap_or(0) + 1
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results, vec![1, 1], "{}", kind);
        assert_eq!(store.get(&key).unwrap(), 1, "{}", kind);
    }
}

#[test]
fn test_sequential_updates_do_not_lose_increments() {
    for kind in KINDS {
        let (_temp, store) = setup_temp_store(kind);
        let key = "counter".to_string();

        for _ in 0..25 {
            store.update(&key, |_, current| current.unwrap_or(0) + 1).unwrap();
        }

        assert_eq!(store.get(&key).unwrap(), 25, "{}", kind);
    }
}

#[test]
fn test_concurrent_puts_all_land() {
    for kind in KINDS {
        let (_temp, store) = setup_temp_store(kind);

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25u64 {
                        store.put(&format!("t{}-{:02}", t, i), &(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count().unwrap(), 100, "{}", kind);
        let sum = store.fold(0u64, |acc, _, v| acc + v).unwrap();
        let expected: u64 = (0..4u64).flat_map(|t| (0..25u64).map(move |i| t * 100 + i)).sum();
        assert_eq!(sum, expected, "{}", kind);
    }
}
