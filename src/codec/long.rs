//! Fixed-size `u64` keys and values.

use super::{Codec, DefaultHashBuilder};
use crate::entry::{self, HEADER_SIZE};
use crate::error::MapError;
use crate::memory::Allocator;
use core::fmt;
use core::hash::BuildHasher;
use core::ptr::{self, NonNull};

const KEY_OFFSET: usize = 0;
const VALUE_OFFSET: usize = 8;
const ENTRY_SIZE: usize = HEADER_SIZE + 16;
const VALUE_SIZE: usize = 8;

/// Codec storing `u64` keys and `u64` values in 40-byte entries.
///
/// Every value has the same size, so updates never reallocate.
#[derive(Clone, Default)]
pub struct LongCodec<S = DefaultHashBuilder> {
    hash_builder: S,
}

impl LongCodec<DefaultHashBuilder> {
    /// Creates a codec with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }
}

impl<S> LongCodec<S> {
    /// Creates a codec hashing keys with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self { hash_builder }
    }
}

unsafe fn word(entry: NonNull<u8>, offset: usize) -> u64 {
    // SAFETY: payload words are 8-byte aligned inside a live entry.
    unsafe { ptr::read(entry::payload(entry).add(offset).cast::<u64>()) }
}

unsafe fn set_word(entry: NonNull<u8>, offset: usize, value: u64) {
    // SAFETY: payload words are 8-byte aligned inside a live entry.
    unsafe { ptr::write(entry::payload(entry).add(offset).cast::<u64>(), value) };
}

impl<S: BuildHasher + Send + Sync> Codec for LongCodec<S> {
    type Key = u64;
    type Value = u64;

    fn hash(&self, key: &u64) -> u64 {
        self.hash_builder.hash_one(key)
    }

    unsafe fn equals_at(&self, entry: NonNull<u8>, key: &u64) -> bool {
        // SAFETY: caller guarantees a live entry.
        unsafe { word(entry, KEY_OFFSET) == *key }
    }

    unsafe fn value_at(&self, entry: NonNull<u8>) -> u64 {
        // SAFETY: caller guarantees a live entry.
        unsafe { word(entry, VALUE_OFFSET) }
    }

    unsafe fn set_value_at(&self, entry: NonNull<u8>, value: &u64) {
        // SAFETY: caller guarantees a live, exclusively locked entry.
        unsafe { set_word(entry, VALUE_OFFSET, *value) };
    }

    fn allocate_entry<A: Allocator + ?Sized>(
        &self,
        allocator: &A,
        key: &u64,
        _hash: u64,
        _size: usize,
    ) -> Result<NonNull<u8>, MapError> {
        let entry = allocator.allocate(ENTRY_SIZE)?;
        // SAFETY: fresh block of `ENTRY_SIZE` bytes.
        unsafe { set_word(entry, KEY_OFFSET, *key) };
        Ok(entry)
    }

    unsafe fn destroy_entry<A: Allocator + ?Sized>(&self, allocator: &A, entry: NonNull<u8>) {
        // SAFETY: caller guarantees the entry came from `allocator`.
        unsafe { allocator.free(entry, ENTRY_SIZE) };
    }

    unsafe fn size_of_entry(&self, _entry: NonNull<u8>) -> usize {
        VALUE_SIZE
    }

    fn size_of_value(&self, _value: &u64) -> usize {
        VALUE_SIZE
    }

    unsafe fn key_at(&self, entry: NonNull<u8>) -> Option<u64> {
        // SAFETY: caller guarantees a live entry.
        Some(unsafe { word(entry, KEY_OFFSET) })
    }
}

impl<S> fmt::Debug for LongCodec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemAllocator;

    #[test]
    fn test_long_entry_round_trip() {
        let codec = LongCodec::new();
        let allocator = SystemAllocator::new();
        let entry = codec.allocate_entry(&allocator, &7, codec.hash(&7), 8).unwrap();

        unsafe {
            codec.set_value_at(entry, &99);
            assert!(codec.equals_at(entry, &7));
            assert!(!codec.equals_at(entry, &8));
            assert_eq!(codec.value_at(entry), 99);
            assert_eq!(codec.key_at(entry), Some(7));
            assert_eq!(codec.size_of_entry(entry), codec.size_of_value(&1));
            codec.destroy_entry(&allocator, entry);
        }
        assert_eq!(allocator.allocated_bytes(), 0);
    }
}
