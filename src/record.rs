//! Record Handles
//!
//! A record pins one entry of an [`OffheapMap`] by holding its segment lock.
//! The lock is released when the record is dropped (or passed to
//! `release`), so the entry cannot disappear while the record is alive and
//! the borrow checker stops a record from outliving its map.
//!
//! | Handle | Lock | Obtained from |
//! |--------|------|---------------|
//! | [`Record`] | shared | [`lock_record_for_read`](OffheapMap::lock_record_for_read), read-only iteration |
//! | [`WritableRecord`] | exclusive | [`lock_record_for_write`](OffheapMap::lock_record_for_write), writable iteration |
//!
//! Records handed to iteration visitors do not own a lock themselves: the
//! iterator holds the bucket's segment for the whole chain.
//!
//! Holding a record blocks every other writer of its segment (and, for a
//! writable record, every reader). Keep records short-lived.

use crate::clock::current_time_millis;
use crate::codec::Codec;
use crate::entry::{self, Slot};
use crate::error::MapError;
use crate::map::OffheapMap;
use crate::memory::Allocator;
use crate::segment::SegmentLocks;
use core::fmt;
use core::ptr::NonNull;
use core::time::Duration;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::borrow::Cow;

/// A live entry held under a shared segment lock.
///
/// # Examples
///
/// ```
/// use offheap_map::{LongCodec, OffheapMap, OffheapMapConfig};
///
/// let map = OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap();
/// map.put(&3, &30).unwrap();
///
/// let record = map.lock_record_for_read(&3).unwrap();
/// assert_eq!(record.value(), 30);
/// record.release();
/// ```
pub struct Record<'a, C: Codec, A: Allocator> {
    map: &'a OffheapMap<C, A>,
    _guard: Option<RwLockReadGuard<'a, ()>>,
    entry: NonNull<u8>,
}

impl<'a, C: Codec, A: Allocator> Record<'a, C, A> {
    pub(crate) fn visiting(map: &'a OffheapMap<C, A>, entry: NonNull<u8>) -> Self {
        Self {
            map,
            _guard: None,
            entry,
        }
    }

    /// Address of the entry block.
    pub fn entry(&self) -> NonNull<u8> {
        self.entry
    }

    /// Stored hash of the entry's key.
    pub fn hash(&self) -> u64 {
        // SAFETY: the entry is pinned by the segment lock.
        unsafe { entry::hash_at(self.entry) }
    }

    /// The entry's key, if the codec can recover it.
    pub fn key(&self) -> Option<<C::Key as ToOwned>::Owned> {
        // SAFETY: the entry is pinned by the segment lock.
        unsafe { self.map.codec().key_at(self.entry) }
    }

    /// Decoded value.
    pub fn value(&self) -> <C::Value as ToOwned>::Owned {
        // SAFETY: the entry is pinned by the segment lock.
        unsafe { self.map.codec().value_at(self.entry) }
    }

    /// Last-touch time in milliseconds since the UNIX epoch.
    pub fn time(&self) -> u64 {
        // SAFETY: the entry is pinned by the segment lock.
        unsafe { entry::time_at(self.entry) }
    }

    /// Refreshes the last-touch time.
    pub fn touch(&self) {
        // SAFETY: the time word is atomic, a shared lock is enough.
        unsafe { entry::set_time_at(self.entry, current_time_millis()) };
    }

    /// Value capacity of the entry, as reported by the codec.
    pub fn size(&self) -> usize {
        // SAFETY: the entry is pinned by the segment lock.
        unsafe { self.map.codec().size_of_entry(self.entry) }
    }

    /// Releases the segment lock.
    pub fn release(self) {}
}

impl<C: Codec, A: Allocator> fmt::Debug for Record<'_, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("entry", &self.entry)
            .field("hash", &self.hash())
            .field("time", &self.time())
            .finish()
    }
}

/// An entry position held under an exclusive segment lock.
///
/// The record either points at an entry or, after a lookup with `create` or a
/// [`remove`](Self::remove), at the chain slot where a new entry would be
/// linked. [`set_value`](Self::set_value) fills that position.
pub struct WritableRecord<'a, C: Codec, A: Allocator> {
    map: &'a OffheapMap<C, A>,
    _guard: Option<RwLockWriteGuard<'a, ()>>,
    entry: Option<NonNull<u8>>,
    key: Option<Cow<'a, C::Key>>,
    slot: Slot,
}

impl<'a, C: Codec, A: Allocator> WritableRecord<'a, C, A> {
    pub(crate) fn visiting(map: &'a OffheapMap<C, A>, entry: NonNull<u8>, slot: Slot) -> Self {
        Self {
            map,
            _guard: None,
            entry: Some(entry),
            key: None,
            slot,
        }
    }

    /// Address of the entry block, or `None` when the position is empty.
    pub fn entry(&self) -> Option<NonNull<u8>> {
        self.entry
    }

    /// Returns `true` when the record points at no entry.
    pub fn is_null(&self) -> bool {
        self.entry.is_none()
    }

    /// Address of the chain word that links the record's position.
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// The record's key.
    ///
    /// Records from [`lock_record_for_write`](OffheapMap::lock_record_for_write)
    /// always know it; during iteration it is recovered through the codec.
    pub fn key(&self) -> Option<Cow<'_, C::Key>> {
        if let Some(key) = &self.key {
            return Some(Cow::Borrowed(&**key));
        }
        let entry = self.entry?;
        // SAFETY: the entry is pinned by the segment lock.
        unsafe { self.map.codec().key_at(entry) }.map(Cow::Owned)
    }

    /// Stored hash of the entry's key.
    pub fn hash(&self) -> Option<u64> {
        // SAFETY: the entry is pinned by the segment lock.
        self.entry.map(|entry| unsafe { entry::hash_at(entry) })
    }

    /// Decoded value.
    pub fn value(&self) -> Option<<C::Value as ToOwned>::Owned> {
        // SAFETY: the entry is pinned by the segment lock.
        self.entry
            .map(|entry| unsafe { self.map.codec().value_at(entry) })
    }

    /// Last-touch time in milliseconds since the UNIX epoch.
    pub fn time(&self) -> Option<u64> {
        // SAFETY: the entry is pinned by the segment lock.
        self.entry.map(|entry| unsafe { entry::time_at(entry) })
    }

    /// Refreshes the last-touch time. Does nothing on an empty position.
    pub fn touch(&self) {
        if let Some(entry) = self.entry {
            // SAFETY: the entry is pinned by the segment lock.
            unsafe { entry::set_time_at(entry, current_time_millis()) };
        }
    }

    /// Value capacity of the entry, as reported by the codec.
    pub fn size(&self) -> Option<usize> {
        // SAFETY: the entry is pinned by the segment lock.
        self.entry
            .map(|entry| unsafe { self.map.codec().size_of_entry(entry) })
    }

    /// Stores `value` at the record's position.
    ///
    /// Follows the same policy as [`OffheapMap::put`]: in place when it fits,
    /// otherwise the old entry is replaced by a new one at the same position,
    /// so an iteration holding this record never sees it twice.
    ///
    /// # Errors
    ///
    /// - [`MapError::MissingKey`] when a new entry is needed and the key is
    ///   unknown. Nothing is modified in that case.
    /// - [`MapError::OutOfMemory`] when the allocation fails. The old entry
    ///   is already gone and the record is left empty.
    pub fn set_value(&mut self, value: &C::Value) -> Result<(), MapError> {
        let map = self.map;
        let size = map.codec().size_of_value(value);

        if let Some(entry) = self.entry {
            // SAFETY: the segment is write-locked.
            if unsafe { map.update_in_place(entry, value, size) } {
                return Ok(());
            }
            if self.key.is_none() {
                // SAFETY: the entry is still linked.
                self.key = unsafe { map.codec().key_at(entry) }.map(Cow::Owned);
            }
            if self.key.is_none() {
                return Err(MapError::MissingKey);
            }
            // SAFETY: `slot` points at `entry` and the segment is write-locked.
            unsafe { map.unlink(self.slot, entry) };
            self.entry = None;
        }

        let key = self.key.as_deref().ok_or(MapError::MissingKey)?;
        let hash = map.codec().hash(key);
        // SAFETY: `slot` belongs to the key's chain and the segment is
        // write-locked.
        let entry = unsafe { map.insert_at(self.slot, key, hash, value, size) }?;
        self.entry = Some(entry);
        Ok(())
    }

    /// Unlinks and destroys the entry. The record keeps its position, so a
    /// later [`set_value`](Self::set_value) re-inserts the key there.
    ///
    /// Does nothing if the position is already empty.
    pub fn remove(&mut self) {
        if let Some(entry) = self.entry.take() {
            // SAFETY: `slot` points at `entry` and the segment is write-locked.
            unsafe { self.map.unlink(self.slot, entry) };
        }
    }

    /// Releases the segment lock.
    pub fn release(self) {}
}

impl<C: Codec, A: Allocator> fmt::Debug for WritableRecord<'_, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritableRecord")
            .field("entry", &self.entry)
            .field("slot", &self.slot)
            .field("hash", &self.hash())
            .finish()
    }
}

impl<C: Codec, A: Allocator> OffheapMap<C, A> {
    /// Locks `key`'s segment for reading and returns its entry.
    ///
    /// Returns `None`, with the lock already released, when the key is
    /// absent or expired. A hit refreshes the timestamp like
    /// [`get`](Self::get).
    pub fn lock_record_for_read(&self, key: &C::Key) -> Option<Record<'_, C, A>> {
        let hash = self.codec().hash(key);
        let guard = self.locks().read(SegmentLocks::segment_for(hash));
        self.read_record(guard, hash, key)
    }

    /// Like [`lock_record_for_read`](Self::lock_record_for_read), giving up
    /// after `timeout`.
    ///
    /// # Errors
    ///
    /// [`MapError::Timeout`] if the segment stays write-locked past `timeout`.
    pub fn try_lock_record_for_read(
        &self,
        key: &C::Key,
        timeout: Duration,
    ) -> Result<Option<Record<'_, C, A>>, MapError> {
        let hash = self.codec().hash(key);
        let guard = self
            .locks()
            .try_read_for(SegmentLocks::segment_for(hash), timeout)?;
        Ok(self.read_record(guard, hash, key))
    }

    fn read_record<'a>(
        &'a self,
        guard: RwLockReadGuard<'a, ()>,
        hash: u64,
        key: &C::Key,
    ) -> Option<Record<'a, C, A>> {
        // SAFETY: `guard` read-locks the key's segment.
        let entry = unsafe {
            let entry = self.find(hash, key).1?;
            if self.is_expired(entry) {
                return None;
            }
            entry
        };
        Some(Record {
            map: self,
            _guard: Some(guard),
            entry,
        })
    }

    /// Locks `key`'s segment for writing and positions a record on its entry.
    ///
    /// When the key is absent, returns an empty record ready for
    /// [`set_value`](WritableRecord::set_value) if `create` is set, and
    /// `None` (lock released) otherwise. Expiry is not checked.
    pub fn lock_record_for_write<'a>(
        &'a self,
        key: &'a C::Key,
        create: bool,
    ) -> Option<WritableRecord<'a, C, A>> {
        let hash = self.codec().hash(key);
        let guard = self.locks().write(SegmentLocks::segment_for(hash));
        self.write_record(guard, hash, key, create)
    }

    /// Like [`lock_record_for_write`](Self::lock_record_for_write), giving up
    /// after `timeout`.
    ///
    /// # Errors
    ///
    /// [`MapError::Timeout`] if the segment stays locked past `timeout`.
    pub fn try_lock_record_for_write<'a>(
        &'a self,
        key: &'a C::Key,
        create: bool,
        timeout: Duration,
    ) -> Result<Option<WritableRecord<'a, C, A>>, MapError> {
        let hash = self.codec().hash(key);
        let guard = self
            .locks()
            .try_write_for(SegmentLocks::segment_for(hash), timeout)?;
        Ok(self.write_record(guard, hash, key, create))
    }

    fn write_record<'a>(
        &'a self,
        guard: RwLockWriteGuard<'a, ()>,
        hash: u64,
        key: &'a C::Key,
        create: bool,
    ) -> Option<WritableRecord<'a, C, A>> {
        // SAFETY: `guard` write-locks the key's segment.
        let (slot, entry) = unsafe { self.find(hash, key) };
        let slot = match entry {
            Some(_) => slot,
            // new keys go to the head of the chain, like `put`
            None if create => self.bucket_for(hash),
            None => return None,
        };
        Some(WritableRecord {
            map: self,
            _guard: Some(guard),
            entry,
            key: Some(Cow::Borrowed(key)),
            slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BlobCodec, LongCodec};
    use crate::config::OffheapMapConfig;
    use std::sync::Arc;
    use std::thread;

    fn long_map() -> OffheapMap<LongCodec> {
        OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap()
    }

    #[test]
    fn test_read_record_accessors() {
        let map = long_map();
        map.put(&1, &100).unwrap();

        let record = map.lock_record_for_read(&1).unwrap();
        assert_eq!(record.value(), 100);
        assert_eq!(record.key(), Some(1));
        assert_eq!(record.hash(), map.codec().hash(&1));
        assert_eq!(record.size(), 8);
        assert!(record.time() > 0);
        drop(record);

        assert!(map.lock_record_for_read(&2).is_none());
    }

    #[test]
    fn test_read_records_share_the_segment() {
        let map = long_map();
        map.put(&1, &1).unwrap();

        let first = map.lock_record_for_read(&1).unwrap();
        let second = map
            .try_lock_record_for_read(&1, Duration::from_millis(1))
            .unwrap()
            .unwrap();
        assert_eq!(first.entry(), second.entry());
    }

    #[test]
    fn test_write_record_create_and_update() {
        let map = long_map();
        assert!(map.lock_record_for_write(&7, false).is_none());

        let mut record = map.lock_record_for_write(&7, true).unwrap();
        assert!(record.is_null());
        assert_eq!(record.value(), None);
        record.set_value(&70).unwrap();
        assert!(!record.is_null());
        assert_eq!(record.value(), Some(70));
        assert_eq!(record.key().as_deref(), Some(&7));
        record.release();

        assert_eq!(map.get(&7), Some(70));
        assert_eq!(map.len(), 1);

        let mut record = map.lock_record_for_write(&7, false).unwrap();
        record.set_value(&71).unwrap();
        drop(record);
        assert_eq!(map.get(&7), Some(71));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_write_record_remove_then_reinsert() {
        let map = OffheapMap::new(OffheapMapConfig::new(1), BlobCodec::new()).unwrap();
        map.put(b"key", b"old").unwrap();

        let mut record = map.lock_record_for_write(b"key", false).unwrap();
        record.remove();
        assert!(record.is_null());
        // second remove is a no-op
        record.remove();
        record.set_value(b"a value longer than before").unwrap();
        drop(record);

        assert_eq!(map.get(b"key"), Some(b"a value longer than before".to_vec()));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_write_lock_times_out_while_held() {
        let map = Arc::new(long_map());
        map.put(&1, &1).unwrap();

        let record = map.lock_record_for_write(&1, false).unwrap();
        let contender = {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let write = map
                    .try_lock_record_for_write(&1, false, Duration::from_millis(20))
                    .err();
                let read = map
                    .try_lock_record_for_read(&1, Duration::from_millis(20))
                    .err();
                (write, read)
            })
        };
        let (write, read) = contender.join().unwrap();
        assert_eq!(write, Some(MapError::Timeout));
        assert_eq!(read, Some(MapError::Timeout));
        drop(record);

        assert!(map
            .try_lock_record_for_write(&1, false, Duration::from_millis(20))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_expired_entry_has_no_read_record() {
        let map = long_map();
        map.put(&1, &1).unwrap();
        {
            let record = map.lock_record_for_write(&1, false).unwrap();
            // SAFETY: the segment is write-locked by `record`.
            unsafe { entry::set_time_at(record.entry().unwrap(), 1) };
        }
        map.settings().set_time_to_live(1000);
        assert!(map.lock_record_for_read(&1).is_none());
        // write lookups ignore expiry
        assert!(map.lock_record_for_write(&1, false).is_some());
    }

    #[test]
    fn test_iteration_record_recovers_key() {
        let map = OffheapMap::new(OffheapMapConfig::new(1), BlobCodec::new()).unwrap();
        map.put(b"alpha", b"1").unwrap();

        map.iterate_mut(|record| {
            assert_eq!(record.key().as_deref(), Some(&b"alpha"[..]));
            // forces a reallocation through the recovered key
            record.set_value(b"a longer replacement").unwrap();
        });
        assert_eq!(map.get(b"alpha"), Some(b"a longer replacement".to_vec()));
        assert_eq!(map.len(), 1);
    }
}
