//! Off-heap Hash Table
//!
//! [`OffheapMap`] is a chained hash table whose bucket array and entries live
//! in blocks obtained from an [`Allocator`]. Concurrency comes from a fixed
//! set of [`CONCURRENCY_LEVEL`] read/write locks ([`SegmentLocks`]).
//!
//! # Addressing
//!
//! ```text
//!            hash (u64, from the codec)
//!   ┌──────────────────────┴──────────────────────┐
//!   │                                             │
//!   ▼                                             ▼
//! hash & 0xFFFF                       (hash & i64::MAX) % capacity
//!   │                                             │
//!   ▼                                             ▼
//! segment lock                          bucket ──▶ entry ──▶ entry ──▶ null
//! ```
//!
//! The bucket count is a multiple of the segment count, so both
//! selections agree: the segment of a hash always owns its bucket.
//!
//! # Update Policy
//!
//! An existing entry is overwritten in place when the new value fits
//! (`size_of_value(new) <= size_of_entry(old)`). Otherwise the old entry is
//! unlinked and destroyed and a new one is allocated at the head of the
//! chain, so chains run from most to least recently inserted. If that
//! allocation fails the key is gone: the old value is not restored.
//!
//! A [`WritableRecord`] replacing its entry keeps the old chain position
//! instead, which is what lets writable iteration resume after it.
//!
//! # Expiry
//!
//! Every entry carries a last-touch time. [`get`](OffheapMap::get) treats an
//! entry older than `time_to_live` as absent but leaves it in place; expired
//! entries are reclaimed in bulk by [`remove_expired`](OffheapMap::remove_expired),
//! usually from a [`CleanupThread`](crate::cleanup::CleanupThread).

use crate::clock::current_time_millis;
use crate::codec::Codec;
use crate::config::{OffheapMapConfig, Settings};
use crate::entry::{self, Slot};
use crate::error::MapError;
use crate::memory::{Allocator, SystemAllocator};
use crate::parallel;
use crate::record::{Record, WritableRecord};
use crate::segment::{SegmentLocks, CONCURRENCY_LEVEL};
use core::fmt;
use core::mem::size_of;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use log::debug;

const SLOT_SIZE: usize = size_of::<*mut u8>();

/// Rounds a requested bucket count up to a non-zero multiple of
/// [`CONCURRENCY_LEVEL`].
fn round_capacity(requested: usize) -> Result<usize, MapError> {
    requested
        .max(1)
        .checked_add(CONCURRENCY_LEVEL - 1)
        .map(|capacity| capacity & !(CONCURRENCY_LEVEL - 1))
        .ok_or(MapError::InvalidLayout { size: requested })
}

/// Entries unlinked from one segment, applied to the map counters on drop.
struct Expired<'a> {
    entries: &'a AtomicI64,
    expirations: &'a AtomicU64,
    count: usize,
}

impl<'a> Expired<'a> {
    fn new(entries: &'a AtomicI64, expirations: &'a AtomicU64) -> Self {
        Self {
            entries,
            expirations,
            count: 0,
        }
    }
}

impl Drop for Expired<'_> {
    fn drop(&mut self) {
        if self.count > 0 {
            self.entries.fetch_sub(self.count as i64, Ordering::Relaxed);
            self.expirations.fetch_add(self.count as u64, Ordering::Relaxed);
        }
    }
}

/// A concurrent hash table storing its entries outside the Rust heap.
///
/// All operations take `&self`; share the map between threads with an
/// [`Arc`](std::sync::Arc) or a scoped borrow.
///
/// # Examples
///
/// ```
/// use offheap_map::{LongCodec, OffheapMap, OffheapMapConfig};
///
/// let map = OffheapMap::new(OffheapMapConfig::new(1000), LongCodec::new()).unwrap();
/// assert_eq!(map.capacity(), 65536);
///
/// map.put(&1, &100).unwrap();
/// assert_eq!(map.get(&1), Some(100));
/// assert!(!map.put_if_absent(&1, &200).unwrap());
/// assert!(map.remove(&1));
/// assert!(map.is_empty());
/// ```
pub struct OffheapMap<C: Codec, A: Allocator = SystemAllocator> {
    codec: C,
    allocator: A,
    locks: SegmentLocks,
    settings: Settings,
    capacity: usize,
    base: NonNull<u8>,
    owns_base: bool,
    count: AtomicI64,
    expirations: AtomicU64,
}

// SAFETY: entries are reached only through `base`, and every access to a
// bucket or an entry's header happens under the owning segment lock. The
// codec and allocator are `Send + Sync` by their trait bounds.
unsafe impl<C: Codec, A: Allocator> Send for OffheapMap<C, A> {}
// SAFETY: see above.
unsafe impl<C: Codec, A: Allocator> Sync for OffheapMap<C, A> {}

impl<C: Codec> OffheapMap<C, SystemAllocator> {
    /// Creates a map that allocates from the global allocator.
    pub fn new(config: OffheapMapConfig, codec: C) -> Result<Self, MapError> {
        Self::with_allocator(config, codec, SystemAllocator::new())
    }
}

impl<C: Codec, A: Allocator> OffheapMap<C, A> {
    /// Creates a map drawing its bucket array and entries from `allocator`.
    pub fn with_allocator(config: OffheapMapConfig, codec: C, allocator: A) -> Result<Self, MapError> {
        let capacity = round_capacity(config.capacity())?;
        let bytes = capacity
            .checked_mul(SLOT_SIZE)
            .ok_or(MapError::InvalidLayout { size: capacity })?;
        let base = allocator.allocate_zeroed(bytes)?;
        Ok(Self::from_parts(config, codec, allocator, capacity, base, true))
    }

    /// Creates a map over an existing bucket array.
    ///
    /// The map never frees `base`; entries are still allocated from
    /// `allocator` and destroyed when the map drops.
    ///
    /// # Safety
    ///
    /// `base` must be 8-byte aligned, point at
    /// `round(config.capacity()) * 8` zeroed bytes (see
    /// [`capacity`](Self::capacity)), and stay valid and otherwise unused for
    /// the lifetime of the map.
    pub unsafe fn with_base(
        config: OffheapMapConfig,
        codec: C,
        allocator: A,
        base: NonNull<u8>,
    ) -> Result<Self, MapError> {
        let capacity = round_capacity(config.capacity())?;
        Ok(Self::from_parts(config, codec, allocator, capacity, base, false))
    }

    fn from_parts(
        config: OffheapMapConfig,
        codec: C,
        allocator: A,
        capacity: usize,
        base: NonNull<u8>,
        owns_base: bool,
    ) -> Self {
        Self {
            codec,
            allocator,
            locks: SegmentLocks::new(),
            settings: Settings::from(&config),
            capacity,
            base,
            owns_base,
            count: AtomicI64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Number of buckets. Always a non-zero multiple of [`CONCURRENCY_LEVEL`].
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries, including expired ones not yet removed.
    #[inline]
    pub fn len(&self) -> usize {
        usize::try_from(self.count.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Returns `true` when the map holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total entries removed by [`remove_expired`](Self::remove_expired) so far.
    #[inline]
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Runtime tunables.
    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The codec encoding this map's entries.
    #[inline]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The allocator backing this map.
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    #[inline]
    pub(crate) fn locks(&self) -> &SegmentLocks {
        &self.locks
    }

    #[inline]
    fn bucket(&self, index: usize) -> Slot {
        debug_assert!(index < self.capacity);
        // SAFETY: `index < capacity` and the array holds `capacity` slots.
        unsafe { self.base.as_ptr().cast::<*mut u8>().add(index) }
    }

    /// Head slot of `hash`'s chain.
    #[inline]
    pub(crate) fn bucket_for(&self, hash: u64) -> Slot {
        let index = (hash & i64::MAX as u64) % self.capacity as u64;
        self.bucket(index as usize)
    }

    /// Bucket indices owned by `segment`.
    #[inline]
    fn buckets_of(&self, segment: usize) -> impl Iterator<Item = usize> {
        (segment..self.capacity).step_by(CONCURRENCY_LEVEL)
    }

    /// Walks the chain of `hash`'s bucket looking for `key`.
    ///
    /// Returns the slot that points at the match, or the empty slot that ends
    /// the chain when there is none.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock of `hash`'s segment.
    pub(crate) unsafe fn find(&self, hash: u64, key: &C::Key) -> (Slot, Option<NonNull<u8>>) {
        let mut slot = self.bucket_for(hash);
        // SAFETY: the segment lock keeps the chain stable.
        unsafe {
            while let Some(entry) = entry::load(slot) {
                if entry::hash_at(entry) == hash && self.codec.equals_at(entry, key) {
                    return (slot, Some(entry));
                }
                slot = entry::next_slot(entry);
            }
        }
        (slot, None)
    }

    /// Returns `true` when the entry is past its time-to-live; otherwise
    /// refreshes its timestamp.
    ///
    /// # Safety
    ///
    /// `entry` must be live and its segment locked (shared is enough).
    pub(crate) unsafe fn is_expired(&self, entry: NonNull<u8>) -> bool {
        let now = current_time_millis();
        // SAFETY: caller contract.
        unsafe {
            if now.saturating_sub(entry::time_at(entry)) > self.settings.time_to_live() {
                return true;
            }
            entry::set_time_at(entry, now);
        }
        false
    }

    /// Allocates a new entry for `key` and links it into `slot`, ahead of
    /// whatever the slot pointed at.
    ///
    /// # Safety
    ///
    /// `slot` must belong to `hash`'s bucket chain and the caller must hold
    /// that segment exclusively.
    pub(crate) unsafe fn insert_at(
        &self,
        slot: Slot,
        key: &C::Key,
        hash: u64,
        value: &C::Value,
        size: usize,
    ) -> Result<NonNull<u8>, MapError> {
        let entry = self.codec.allocate_entry(&self.allocator, key, hash, size)?;
        // SAFETY: `entry` is fresh and unreachable until stored into `slot`.
        unsafe {
            entry::set_hash_at(entry, hash);
            entry::store(entry::next_slot(entry), entry::load(slot));
            entry::set_time_at(entry, current_time_millis());
            self.codec.set_value_at(entry, value);
            entry::store(slot, Some(entry));
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(entry)
    }

    /// Overwrites the value of `entry` if the new one fits.
    ///
    /// # Safety
    ///
    /// `entry` must be live and its segment locked exclusively.
    pub(crate) unsafe fn update_in_place(&self, entry: NonNull<u8>, value: &C::Value, size: usize) -> bool {
        // SAFETY: caller contract.
        unsafe {
            if size > self.codec.size_of_entry(entry) {
                return false;
            }
            entry::set_time_at(entry, current_time_millis());
            self.codec.set_value_at(entry, value);
        }
        true
    }

    /// Unlinks `entry` from `slot` and destroys it.
    ///
    /// # Safety
    ///
    /// `slot` must point at `entry` and the caller must hold its segment
    /// exclusively. `entry` must not be used afterwards.
    pub(crate) unsafe fn unlink(&self, slot: Slot, entry: NonNull<u8>) {
        // SAFETY: caller contract.
        unsafe {
            entry::store(slot, entry::load(entry::next_slot(entry)));
            self.codec.destroy_entry(&self.allocator, entry);
        }
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the value of `key`, or `None` when the key is absent or
    /// expired.
    ///
    /// A hit refreshes the entry's timestamp. An expired entry is left in the
    /// map with its timestamp untouched.
    pub fn get(&self, key: &C::Key) -> Option<<C::Value as ToOwned>::Owned> {
        let hash = self.codec.hash(key);
        let _guard = self.locks.read(SegmentLocks::segment_for(hash));
        // SAFETY: the segment is read-locked.
        unsafe {
            let (_, entry) = self.find(hash, key);
            let entry = entry?;
            if self.is_expired(entry) {
                return None;
            }
            Some(self.codec.value_at(entry))
        }
    }

    /// Inserts or replaces the value of `key`.
    ///
    /// New and reallocated entries are linked at the head of their chain.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::OutOfMemory`] when a new entry is needed and the
    /// allocator refuses it. A previous value too large to reuse has already
    /// been removed at that point.
    pub fn put(&self, key: &C::Key, value: &C::Value) -> Result<(), MapError> {
        let hash = self.codec.hash(key);
        let size = self.codec.size_of_value(value);
        let _guard = self.locks.write(SegmentLocks::segment_for(hash));
        // SAFETY: the segment is write-locked.
        unsafe {
            let (slot, entry) = self.find(hash, key);
            if let Some(entry) = entry {
                if self.update_in_place(entry, value, size) {
                    return Ok(());
                }
                self.unlink(slot, entry);
            }
            self.insert_at(self.bucket_for(hash), key, hash, value, size)?;
        }
        Ok(())
    }

    /// Inserts `value` only if `key` has no entry. Returns whether it did.
    ///
    /// An expired entry still counts as present.
    pub fn put_if_absent(&self, key: &C::Key, value: &C::Value) -> Result<bool, MapError> {
        let hash = self.codec.hash(key);
        let _guard = self.locks.write(SegmentLocks::segment_for(hash));
        // SAFETY: the segment is write-locked.
        unsafe {
            if self.find(hash, key).1.is_some() {
                return Ok(false);
            }
            self.insert_at(self.bucket_for(hash), key, hash, value, self.codec.size_of_value(value))?;
        }
        Ok(true)
    }

    /// Removes `key`. Returns whether an entry was removed.
    pub fn remove(&self, key: &C::Key) -> bool {
        let hash = self.codec.hash(key);
        let _guard = self.locks.write(SegmentLocks::segment_for(hash));
        // SAFETY: the segment is write-locked.
        unsafe {
            match self.find(hash, key) {
                (slot, Some(entry)) => {
                    self.unlink(slot, entry);
                    true
                }
                (_, None) => false,
            }
        }
    }

    /// Refreshes the timestamp of `key` without reading it, even if it has
    /// expired.
    pub fn touch(&self, key: &C::Key) {
        let hash = self.codec.hash(key);
        let _guard = self.locks.read(SegmentLocks::segment_for(hash));
        // SAFETY: the segment is read-locked; the time word is atomic.
        unsafe {
            if let (_, Some(entry)) = self.find(hash, key) {
                entry::set_time_at(entry, current_time_millis());
            }
        }
    }

    /// Number of entries above the occupancy target.
    ///
    /// The target is `capacity * (1 - cleanup_threshold)`; a negative result
    /// means there is room to spare.
    pub fn entries_to_clean(&self) -> i64 {
        let target = self.capacity as f64 * (1.0 - self.settings.cleanup_threshold());
        self.count.load(Ordering::Relaxed) - target as i64
    }

    /// Removes every entry last touched `age` or more milliseconds ago.
    ///
    /// Each segment is locked for at most `lock_wait_time`; a segment that
    /// stays busy is skipped for this call. Entry counters are updated as
    /// each segment finishes. Returns the number of entries removed.
    pub fn remove_expired(&self, age: u64) -> usize {
        let expiration_time = current_time_millis().saturating_sub(age);
        let wait = self.settings.lock_wait();
        let mut expired = 0;

        for segment in 0..CONCURRENCY_LEVEL {
            let Ok(_guard) = self.locks.try_write_for(segment, wait) else {
                debug!("could not lock segment {} for cleanup", segment);
                continue;
            };
            // counters follow every unlink, even if a destroy unwinds
            let mut removed = Expired::new(&self.count, &self.expirations);

            for index in self.buckets_of(segment) {
                let mut slot = self.bucket(index);
                // SAFETY: the segment is write-locked.
                unsafe {
                    while let Some(entry) = entry::load(slot) {
                        if entry::time_at(entry) <= expiration_time {
                            entry::store(slot, entry::load(entry::next_slot(entry)));
                            removed.count += 1;
                            self.codec.destroy_entry(&self.allocator, entry);
                        } else {
                            slot = entry::next_slot(entry);
                        }
                    }
                }
            }
            expired += removed.count;
        }

        expired
    }

    /// Removes every entry, waiting for each segment lock in turn.
    pub fn clear(&self) {
        let mut cleared = 0;

        for segment in 0..CONCURRENCY_LEVEL {
            let _guard = self.locks.write(segment);
            for index in self.buckets_of(segment) {
                // SAFETY: the segment is write-locked.
                unsafe { cleared += self.destroy_chain(self.bucket(index)) };
            }
        }

        self.count.fetch_sub(cleared as i64, Ordering::Relaxed);
    }

    /// Destroys the chain hanging off `slot` and empties the slot.
    ///
    /// # Safety
    ///
    /// The caller must hold the slot's segment exclusively (or own the map).
    unsafe fn destroy_chain(&self, slot: Slot) -> usize {
        let mut destroyed = 0;
        // SAFETY: caller contract.
        unsafe {
            let mut next = entry::load(slot);
            while let Some(entry) = next {
                next = entry::load(entry::next_slot(entry));
                self.codec.destroy_entry(&self.allocator, entry);
                destroyed += 1;
            }
            entry::store(slot, None);
        }
        destroyed
    }

    /// Copies up to `timestamps.len()` entry timestamps into `timestamps`.
    ///
    /// Segments are visited circularly from `start_segment`, each under a
    /// shared lock, stopping when the buffer is full or every segment has
    /// been seen. Entries come in chain order, so long chains are
    /// over-represented. Returns the number of timestamps written.
    pub fn collect_samples(&self, timestamps: &mut [u64], start_segment: usize) -> usize {
        if timestamps.is_empty() {
            return 0;
        }

        let start = start_segment & (CONCURRENCY_LEVEL - 1);
        let mut samples = 0;
        for offset in 0..CONCURRENCY_LEVEL {
            let segment = (start + offset) & (CONCURRENCY_LEVEL - 1);
            let _guard = self.locks.read(segment);
            for index in self.buckets_of(segment) {
                let mut slot = self.bucket(index);
                // SAFETY: the segment is read-locked.
                unsafe {
                    while let Some(entry) = entry::load(slot) {
                        timestamps[samples] = entry::time_at(entry);
                        samples += 1;
                        if samples == timestamps.len() {
                            return samples;
                        }
                        slot = entry::next_slot(entry);
                    }
                }
            }
        }
        samples
    }

    /// Calls `visitor` for every entry, one bucket at a time under a shared
    /// lock. Expired entries are visited too.
    pub fn iterate<F>(&self, visitor: F)
    where
        F: FnMut(&Record<'_, C, A>),
    {
        self.iterate_partition(visitor, 0, 1);
    }

    /// Splits [`iterate`](Self::iterate) across `workers` threads.
    pub fn iterate_parallel<F>(&self, visitor: F, workers: usize)
    where
        F: Fn(&Record<'_, C, A>) + Sync,
    {
        parallel::fork(workers, |task, count| {
            self.iterate_partition(|record| visitor(record), task, count);
        });
    }

    /// Visits the buckets `task, task + task_count, ...`.
    ///
    /// # Panics
    ///
    /// Panics if `task_count` is zero.
    pub fn iterate_partition<F>(&self, mut visitor: F, task: usize, task_count: usize)
    where
        F: FnMut(&Record<'_, C, A>),
    {
        assert!(task_count > 0, "task count must be > 0");
        for index in (task..self.capacity).step_by(task_count) {
            let _guard = self.locks.read(SegmentLocks::segment_of_bucket(index));
            let mut slot = self.bucket(index);
            // SAFETY: the segment is read-locked and a shared visitor cannot
            // change the chain.
            while let Some(entry) = unsafe { entry::load(slot) } {
                visitor(&Record::visiting(self, entry));
                slot = unsafe { entry::next_slot(entry) };
            }
        }
    }

    /// Calls `visitor` for every entry under an exclusive lock. The visitor
    /// may update or remove the entry through the record.
    pub fn iterate_mut<F>(&self, visitor: F)
    where
        F: FnMut(&mut WritableRecord<'_, C, A>),
    {
        self.iterate_mut_partition(visitor, 0, 1);
    }

    /// Splits [`iterate_mut`](Self::iterate_mut) across `workers` threads.
    pub fn iterate_mut_parallel<F>(&self, visitor: F, workers: usize)
    where
        F: Fn(&mut WritableRecord<'_, C, A>) + Sync,
    {
        parallel::fork(workers, |task, count| {
            self.iterate_mut_partition(|record| visitor(record), task, count);
        });
    }

    /// Writable counterpart of [`iterate_partition`](Self::iterate_partition).
    ///
    /// After the visitor returns, the walk continues after the record's entry,
    /// or from the record's slot when the entry was removed.
    ///
    /// # Panics
    ///
    /// Panics if `task_count` is zero.
    pub fn iterate_mut_partition<F>(&self, mut visitor: F, task: usize, task_count: usize)
    where
        F: FnMut(&mut WritableRecord<'_, C, A>),
    {
        assert!(task_count > 0, "task count must be > 0");
        for index in (task..self.capacity).step_by(task_count) {
            let _guard = self.locks.write(SegmentLocks::segment_of_bucket(index));
            let mut slot = self.bucket(index);
            // SAFETY: the segment is write-locked; the record only rewrites
            // `slot` and the entry it points at.
            while let Some(entry) = unsafe { entry::load(slot) } {
                let mut record = WritableRecord::visiting(self, entry, slot);
                visitor(&mut record);
                if let Some(entry) = record.entry() {
                    slot = unsafe { entry::next_slot(entry) };
                }
            }
        }
    }
}

impl<C: Codec, A: Allocator> Drop for OffheapMap<C, A> {
    fn drop(&mut self) {
        for index in 0..self.capacity {
            // SAFETY: `&mut self` rules out every other accessor.
            unsafe { self.destroy_chain(self.bucket(index)) };
        }
        if self.owns_base {
            // SAFETY: allocated in `with_allocator` with this exact size.
            unsafe { self.allocator.free(self.base, self.capacity * SLOT_SIZE) };
        }
    }
}

impl<C: Codec, A: Allocator> fmt::Debug for OffheapMap<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffheapMap")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("expirations", &self.expirations())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BlobCodec, LongCodec};
    use crate::memory::BoundedAllocator;

    fn long_map() -> OffheapMap<LongCodec> {
        OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap()
    }

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(round_capacity(0), Ok(CONCURRENCY_LEVEL));
        assert_eq!(round_capacity(1), Ok(CONCURRENCY_LEVEL));
        assert_eq!(round_capacity(CONCURRENCY_LEVEL), Ok(CONCURRENCY_LEVEL));
        assert_eq!(round_capacity(CONCURRENCY_LEVEL + 1), Ok(2 * CONCURRENCY_LEVEL));
        assert_eq!(
            round_capacity(usize::MAX),
            Err(MapError::InvalidLayout { size: usize::MAX })
        );
    }

    #[test]
    fn test_bucket_array_is_allocated_and_freed() {
        let allocator = BoundedAllocator::new(usize::MAX);
        let map = OffheapMap::with_allocator(OffheapMapConfig::new(10), LongCodec::new(), &allocator).unwrap();
        assert_eq!(allocator.allocated_bytes(), CONCURRENCY_LEVEL * SLOT_SIZE);

        map.put(&1, &1).unwrap();
        assert!(allocator.allocated_bytes() > CONCURRENCY_LEVEL * SLOT_SIZE);
        drop(map);
        assert_eq!(allocator.allocated_bytes(), 0);
    }

    #[test]
    fn test_with_base_leaves_bucket_array_alone() {
        let allocator = SystemAllocator::new();
        let base = allocator.allocate_zeroed(CONCURRENCY_LEVEL * SLOT_SIZE).unwrap();
        let map = unsafe { OffheapMap::with_base(OffheapMapConfig::new(1), LongCodec::new(), &allocator, base) }.unwrap();
        map.put(&9, &90).unwrap();
        assert_eq!(map.get(&9), Some(90));
        drop(map);

        assert_eq!(allocator.allocated_bytes(), CONCURRENCY_LEVEL * SLOT_SIZE);
        unsafe { allocator.free(base, CONCURRENCY_LEVEL * SLOT_SIZE) };
    }

    #[test]
    fn test_put_get_remove() {
        let map = long_map();
        assert_eq!(map.get(&1), None);

        map.put(&1, &10).unwrap();
        map.put(&2, &20).unwrap();
        assert_eq!(map.get(&1), Some(10));
        assert_eq!(map.get(&2), Some(20));
        assert_eq!(map.len(), 2);

        map.put(&1, &11).unwrap();
        assert_eq!(map.get(&1), Some(11));
        assert_eq!(map.len(), 2);

        assert!(map.remove(&1));
        assert!(!map.remove(&1));
        assert_eq!(map.get(&1), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_put_if_absent() {
        let map = long_map();
        assert!(map.put_if_absent(&5, &50).unwrap());
        assert!(!map.put_if_absent(&5, &51).unwrap());
        assert_eq!(map.get(&5), Some(50));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_blob_grows_and_shrinks() {
        let map = OffheapMap::new(OffheapMapConfig::new(1), BlobCodec::new()).unwrap();
        map.put(b"k", b"short").unwrap();
        let small = map.allocator().allocated_bytes();

        map.put(b"k", b"a much longer value").unwrap();
        assert_eq!(map.get(b"k"), Some(b"a much longer value".to_vec()));
        assert!(map.allocator().allocated_bytes() > small);
        assert_eq!(map.len(), 1);

        // fits in the grown entry, no reallocation
        let grown = map.allocator().allocated_bytes();
        map.put(b"k", b"tiny").unwrap();
        assert_eq!(map.get(b"k"), Some(b"tiny".to_vec()));
        assert_eq!(map.allocator().allocated_bytes(), grown);
    }

    #[test]
    fn test_many_keys_share_buckets() {
        let map = long_map();
        for key in 0..200_000u64 {
            map.put(&key, &(key * 2)).unwrap();
        }
        assert_eq!(map.len(), 200_000);
        for key in (0..200_000u64).step_by(997) {
            assert_eq!(map.get(&key), Some(key * 2));
        }
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let map = long_map();
        map.put(&1, &1).unwrap();
        map.settings().set_time_to_live(0);

        let hash = map.codec().hash(&1);
        // age the entry by hand
        {
            let _guard = map.locks().write(SegmentLocks::segment_for(hash));
            let (_, entry) = unsafe { map.find(hash, &1) };
            unsafe { entry::set_time_at(entry.unwrap(), current_time_millis() - 1000) };
        }
        assert_eq!(map.get(&1), None);
        // still stored until a sweep removes it
        assert_eq!(map.len(), 1);
        assert_eq!(map.remove_expired(500), 1);
        assert_eq!(map.len(), 0);
        assert_eq!(map.expirations(), 1);
    }

    #[test]
    fn test_entries_to_clean() {
        let map = long_map();
        map.settings().set_cleanup_threshold(0.1);
        assert_eq!(map.entries_to_clean(), -(((CONCURRENCY_LEVEL as f64) * 0.9) as i64));

        map.settings().set_cleanup_threshold(1.0);
        map.put(&1, &1).unwrap();
        assert_eq!(map.entries_to_clean(), 1);
    }

    #[test]
    fn test_clear() {
        let map = long_map();
        for key in 0..1000u64 {
            map.put(&key, &key).unwrap();
        }
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get(&3), None);
        assert_eq!(map.allocator().allocated_bytes(), CONCURRENCY_LEVEL * SLOT_SIZE);
    }

    #[test]
    fn test_collect_samples() {
        let map = long_map();
        let mut buffer = [0u64; 16];
        assert_eq!(map.collect_samples(&mut buffer, 123), 0);

        for key in 0..100u64 {
            map.put(&key, &key).unwrap();
        }
        assert_eq!(map.collect_samples(&mut buffer, 40_000), 16);

        let mut large = vec![0u64; 1000];
        let collected = map.collect_samples(&mut large, 7);
        assert_eq!(collected, 100);
        assert!(large[..collected].iter().all(|&time| time > 0));
    }

    #[test]
    fn test_iterate_visits_every_entry() {
        let map = long_map();
        for key in 0..500u64 {
            map.put(&key, &(key + 1)).unwrap();
        }

        let mut sum = 0;
        let mut visited = 0;
        map.iterate(|record| {
            sum += record.value();
            visited += 1;
        });
        assert_eq!(visited, 500);
        assert_eq!(sum, (1..=500u64).sum::<u64>());
    }

    #[test]
    fn test_iterate_mut_removes_odd_keys() {
        let map = long_map();
        for key in 0..1000u64 {
            map.put(&key, &key).unwrap();
        }

        map.iterate_mut(|record| {
            if record.value().is_some_and(|value| value % 2 == 1) {
                record.remove();
            }
        });

        assert_eq!(map.len(), 500);
        for key in 0..1000u64 {
            assert_eq!(map.get(&key).is_some(), key % 2 == 0);
        }
    }
}
