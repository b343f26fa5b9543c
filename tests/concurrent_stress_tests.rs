//! Stress Tests for Concurrent Access
//!
//! These tests verify thread safety and correctness under high contention:
//! many threads hammer overlapping keys while iteration and cleanup run
//! alongside, then the map's entry count is checked against a full walk.

use offheap_map::segment::SegmentLocks;
use offheap_map::{
    BasicSweeper, BlobCodec, CleanupThread, Codec, LongCodec, OffheapMap, OffheapMapConfig,
    SamplingSweeper,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const NUM_THREADS: usize = 16;
const OPS_PER_THREAD: usize = 10_000;
const KEY_SPACE: u64 = 1_000;

fn counted_entries<C: offheap_map::Codec>(map: &OffheapMap<C>) -> usize {
    let mut count = 0;
    map.iterate(|_| count += 1);
    count
}

/// Mixed put/get/remove over a small shared key space.
#[test]
fn test_mixed_operations_keep_count_consistent() {
    let map = Arc::new(OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap());
    let mut handles = vec![];

    for t in 0..NUM_THREADS {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD {
                let key = ((t * 7919 + i) as u64) % KEY_SPACE;
                match i % 4 {
                    0 | 1 => map.put(&key, &(key * 2)).unwrap(),
                    2 => {
                        // values are only ever key * 2
                        if let Some(value) = map.get(&key) {
                            assert_eq!(value, key * 2);
                        }
                    }
                    _ => {
                        map.remove(&key);
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert!(map.len() as u64 <= KEY_SPACE);
    assert_eq!(map.len(), counted_entries(&map));
}

/// Concurrent `put_if_absent` on the same keys succeeds exactly once per key.
#[test]
fn test_put_if_absent_races() {
    let map = Arc::new(OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap());
    let wins = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for t in 0..NUM_THREADS {
        let map = Arc::clone(&map);
        let wins = Arc::clone(&wins);
        handles.push(thread::spawn(move || {
            for key in 0..KEY_SPACE {
                if map.put_if_absent(&key, &(t as u64)).unwrap() {
                    wins.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(wins.load(Ordering::Relaxed), KEY_SPACE as usize);
    assert_eq!(map.len(), KEY_SPACE as usize);
}

/// Read-modify-write through write records never loses an increment.
#[test]
fn test_write_records_serialize_increments() {
    let map = Arc::new(OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap());
    let keys = 8u64;
    let mut handles = vec![];

    for _ in 0..NUM_THREADS {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..1_000u64 {
                let key = i % keys;
                let mut record = map.lock_record_for_write(&key, true).unwrap();
                let value = record.value().unwrap_or(0);
                record.set_value(&(value + 1)).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let total: u64 = (0..keys).map(|key| map.get(&key).unwrap()).sum();
    assert_eq!(total, (NUM_THREADS * 1_000) as u64);
}

/// Variable-size values grow and shrink concurrently without corrupting
/// neighbours.
#[test]
fn test_blob_resizing_under_contention() {
    let map = Arc::new(OffheapMap::new(OffheapMapConfig::new(1), BlobCodec::new()).unwrap());
    let mut handles = vec![];

    for t in 0..NUM_THREADS {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD / 10 {
                let key = ((t + i) as u64 % 100).to_le_bytes();
                let len = (i * 37) % 300;
                // every value is filled with its key's low byte
                let value = vec![key[0]; len];
                map.put(&key, &value).unwrap();

                if let Some(read) = map.get(&key) {
                    assert!(read.iter().all(|&byte| byte == key[0]));
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(map.len(), 100);
    assert_eq!(map.len(), counted_entries(&map));
}

/// Writers, readers, parallel iteration and a cleanup thread all at once.
#[test]
fn test_operations_with_cleanup_and_iteration() {
    let map = Arc::new(
        OffheapMap::new(
            OffheapMapConfig::new(1)
                .with_time_to_live(5)
                .with_cleanup_interval(1)
                .with_lock_wait_time(1),
            LongCodec::new(),
        )
        .unwrap(),
    );
    let cleanup = CleanupThread::spawn("stress-cleanup", Arc::clone(&map), BasicSweeper::new()).unwrap();
    let mut handles = vec![];

    for t in 0..NUM_THREADS / 2 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD {
                let key = ((t * 31 + i) as u64) % KEY_SPACE;
                if i % 2 == 0 {
                    map.put(&key, &key).unwrap();
                } else if let Some(value) = map.get(&key) {
                    assert_eq!(value, key);
                }
            }
        }));
    }

    for _ in 0..2 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for _ in 0..5 {
                map.iterate_parallel(
                    |record| {
                        assert_eq!(record.key(), Some(record.value()));
                    },
                    4,
                );
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    cleanup.stop();

    assert_eq!(map.len(), counted_entries(&map));
}

/// The sampling sweeper keeps a full map near its occupancy target while
/// writers keep inserting.
#[test]
fn test_sampling_cleanup_under_load() {
    let map = Arc::new(
        OffheapMap::new(
            OffheapMapConfig::new(1)
                .with_cleanup_threshold(0.9)
                .with_cleanup_interval(1),
            LongCodec::new(),
        )
        .unwrap(),
    );
    let cleanup =
        CleanupThread::spawn("sampling-stress", Arc::clone(&map), SamplingSweeper::with_seed(11)).unwrap();
    let mut handles = vec![];

    for t in 0..NUM_THREADS / 4 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD {
                let key = (t * OPS_PER_THREAD + i) as u64;
                map.put(&key, &key).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    cleanup.stop();

    assert!(map.len() <= NUM_THREADS / 4 * OPS_PER_THREAD);
    assert_eq!(map.len(), counted_entries(&map));
}

/// Parallel writable iteration removes exactly the selected entries.
#[test]
fn test_parallel_writable_iteration() {
    let map = OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap();
    for key in 0..50_000u64 {
        map.put(&key, &key).unwrap();
    }

    let removed = AtomicUsize::new(0);
    map.iterate_mut_parallel(
        |record| {
            if record.value().is_some_and(|value| value % 3 == 0) {
                record.remove();
                removed.fetch_add(1, Ordering::Relaxed);
            }
        },
        8,
    );

    assert_eq!(removed.load(Ordering::Relaxed), 16_667);
    assert_eq!(map.len(), 50_000 - 16_667);
    assert_eq!(map.len(), counted_entries(&map));
}

/// A held write record blocks only its own segment.
#[test]
fn test_other_segments_stay_available_while_one_is_locked() {
    let map = Arc::new(OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap());
    let held = 1u64;
    let held_segment = SegmentLocks::segment_for(map.codec().hash(&held));
    let others: Vec<u64> = (2..KEY_SPACE)
        .filter(|key| SegmentLocks::segment_for(map.codec().hash(key)) != held_segment)
        .take(100)
        .collect();
    assert!(!others.is_empty());

    let mut record = map.lock_record_for_write(&held, true).unwrap();
    record.set_value(&10).unwrap();

    let worker = {
        let map = Arc::clone(&map);
        let others = others.clone();
        thread::spawn(move || {
            others
                .iter()
                .map(|&key| {
                    map.put(&key, &(key * 5)).unwrap();
                    map.get(&key)
                })
                .collect::<Vec<_>>()
        })
    };
    // joined while the record still holds its segment
    let values = worker.join().expect("Thread panicked");
    drop(record);

    let expected: Vec<_> = others.iter().map(|&key| Some(key * 5)).collect();
    assert_eq!(values, expected);
    assert_eq!(map.get(&held), Some(10));
    assert_eq!(map.len(), others.len() + 1);
}
