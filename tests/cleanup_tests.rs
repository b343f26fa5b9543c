//! Cleanup Tests
//!
//! Sweeps, expiry and the cleanup thread, driven through the public API.
//!
//! ## Test Strategy
//! - Entry ages are controlled by sleeping between inserts rather than by
//!   editing headers, so only public operations are involved
//! - Lock contention is created by holding a write record while sweeping

use offheap_map::segment::SegmentLocks;
use offheap_map::{
    BasicSweeper, CacheMetrics, CleanupThread, Codec, LongCodec, OffheapMap, OffheapMapConfig,
    SamplingSweeper, Sweeper,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

// ============================================================================
// SWEEPERS
// ============================================================================

#[test]
fn test_below_target_nothing_is_sampled() {
    let map = OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap();
    for key in 0..1000u64 {
        map.put(&key, &key).unwrap();
    }

    // 65536 * 0.9 entries fit before cleanup starts
    assert_eq!(map.entries_to_clean(), 1000 - 58_982);
    assert_eq!(SamplingSweeper::with_seed(7).sweep(&map), 0);
    assert_eq!(map.len(), 1000);
    assert_eq!(map.expirations(), 0);
}

#[test]
fn test_sampling_prefers_old_entries() {
    let map = OffheapMap::new(
        OffheapMapConfig::new(1)
            .with_cleanup_threshold(1.0 - 201.5 / 65536.0)
            .with_max_samples(100_000),
        LongCodec::new(),
    )
    .unwrap();

    for key in 0..200u64 {
        map.put(&key, &key).unwrap();
    }
    thread::sleep(Duration::from_millis(50));
    for key in 200..400u64 {
        map.put(&key, &key).unwrap();
    }

    // a target of 201 entries leaves 199 to clean, so the cut-off is the
    // 200th oldest timestamp: the youngest of the first batch
    assert_eq!(map.entries_to_clean(), 199);
    let removed = SamplingSweeper::with_seed(1).sweep(&map);
    assert_eq!(removed, 200);
    assert!((0..200u64).all(|key| map.get(&key).is_none()));
    assert!((200..400u64).all(|key| map.get(&key) == Some(key)));
}

#[test]
fn test_basic_sweeper_uses_current_time_to_live() {
    let map = OffheapMap::new(
        OffheapMapConfig::new(1).with_time_to_live(60_000),
        LongCodec::new(),
    )
    .unwrap();
    for key in 0..100u64 {
        map.put(&key, &key).unwrap();
    }
    thread::sleep(Duration::from_millis(5));

    let mut sweeper = BasicSweeper::new();
    assert_eq!(sweeper.sweep(&map), 0);

    map.settings().set_time_to_live(1);
    assert_eq!(sweeper.sweep(&map), 100);
    assert!(map.is_empty());
    assert_eq!(map.expirations(), 100);
}

// ============================================================================
// LOCK CONTENTION
// ============================================================================

#[test]
fn test_remove_expired_skips_locked_segment() {
    let map = OffheapMap::new(
        OffheapMapConfig::new(1).with_lock_wait_time(1),
        LongCodec::new(),
    )
    .unwrap();
    for key in 0..1000u64 {
        map.put(&key, &key).unwrap();
    }
    thread::sleep(Duration::from_millis(5));

    let held = 500u64;
    let held_segment = SegmentLocks::segment_for(map.codec().hash(&held));
    let sharing = (0..1000u64)
        .filter(|key| SegmentLocks::segment_for(map.codec().hash(key)) == held_segment)
        .count();

    // the record's segment stays busy for the whole sweep
    let record = map.lock_record_for_write(&held, false).unwrap();
    let removed = map.remove_expired(0);
    drop(record);

    assert_eq!(removed, 1000 - sharing);
    assert_eq!(map.len(), sharing);
    assert_eq!(map.get(&held), Some(held));

    assert_eq!(map.remove_expired(0), sharing);
    assert!(map.is_empty());
}

#[test]
fn test_try_lock_times_out_on_held_segment() {
    let map = Arc::new(OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap());
    map.put(&1, &1).unwrap();

    let record = map.lock_record_for_write(&1, false).unwrap();
    let contender = {
        let map = Arc::clone(&map);
        thread::spawn(move || {
            let read = map
                .try_lock_record_for_read(&1, Duration::from_millis(10))
                .map(|record| record.is_some());
            let write = map
                .try_lock_record_for_write(&1, false, Duration::from_millis(10))
                .map(|record| record.is_some());
            (read, write)
        })
    };
    let (read, write) = contender.join().expect("Thread panicked");
    drop(record);

    assert_eq!(read, Err(offheap_map::MapError::Timeout));
    assert_eq!(write, Err(offheap_map::MapError::Timeout));
    assert!(map
        .try_lock_record_for_read(&1, Duration::from_millis(10))
        .unwrap()
        .is_some());
}

// ============================================================================
// CLEANUP THREAD
// ============================================================================

#[test]
fn test_cleanup_thread_expires_entries() {
    let map = Arc::new(
        OffheapMap::new(
            OffheapMapConfig::new(1)
                .with_time_to_live(20)
                .with_cleanup_interval(5),
            LongCodec::new(),
        )
        .unwrap(),
    );
    let cleanup = CleanupThread::spawn("ttl-cleanup", Arc::clone(&map), BasicSweeper::new()).unwrap();

    for key in 0..100u64 {
        map.put(&key, &key).unwrap();
    }
    assert!(wait_until(|| map.is_empty()));
    cleanup.stop();

    assert_eq!(map.expirations(), 100);
    assert_eq!(map.metrics().get("entries"), Some(&0.0));
}

#[test]
fn test_interval_change_takes_effect() {
    let map = Arc::new(
        OffheapMap::new(
            OffheapMapConfig::new(1)
                .with_time_to_live(0)
                .with_cleanup_interval(3_600_000),
            LongCodec::new(),
        )
        .unwrap(),
    );
    let cleanup = CleanupThread::spawn("slow-cleanup", Arc::clone(&map), BasicSweeper::new()).unwrap();

    // the first wait uses the old interval, so force one round to pick up
    // the new one
    map.settings().set_cleanup_interval(5);
    cleanup.force();

    map.put(&1, &1).unwrap();
    assert!(wait_until(|| map.is_empty()));
    map.put(&2, &2).unwrap();
    assert!(wait_until(|| map.is_empty()));
    drop(cleanup);

    assert_eq!(map.expirations(), 2);
}

#[test]
fn test_stop_while_idle_returns_promptly() {
    let map = Arc::new(
        OffheapMap::new(
            OffheapMapConfig::new(1).with_cleanup_interval(3_600_000),
            LongCodec::new(),
        )
        .unwrap(),
    );
    let cleanup = CleanupThread::spawn("idle-cleanup", map, SamplingSweeper::new()).unwrap();

    let start = Instant::now();
    cleanup.stop();
    assert!(start.elapsed() < Duration::from_secs(5));
}
