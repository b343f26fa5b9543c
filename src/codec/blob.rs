//! Byte-string keys and values.
//!
//! # Payload Layout
//!
//! ```text
//! ┌─────────┬──────────┬───────────┬──────────┬───────────┬──────────────────┐
//! │ key len │ capacity │ value len │ reserved │ key bytes │ value bytes      │
//! │  u32    │   u32    │   u32     │   u32    │           │ (capacity bytes) │
//! └─────────┴──────────┴───────────┴──────────┴───────────┴──────────────────┘
//! ```
//!
//! `capacity` is fixed when the entry is allocated. Shorter values are
//! written in place; longer ones force the map to allocate a new entry.

use super::{Codec, DefaultHashBuilder};
use crate::entry::{self, HEADER_SIZE};
use crate::error::MapError;
use crate::memory::Allocator;
use core::fmt;
use core::hash::BuildHasher;
use core::ptr::{self, NonNull};

const KEY_LEN_OFFSET: usize = 0;
const CAPACITY_OFFSET: usize = 4;
const VALUE_LEN_OFFSET: usize = 8;
const DATA_OFFSET: usize = 16;

/// Codec storing `[u8]` keys and `[u8]` values.
///
/// # Examples
///
/// ```
/// use offheap_map::{BlobCodec, OffheapMap, OffheapMapConfig};
///
/// let map = OffheapMap::new(OffheapMapConfig::new(1), BlobCodec::new()).unwrap();
/// map.put(b"user:1", b"alice").unwrap();
/// assert_eq!(map.get(b"user:1"), Some(b"alice".to_vec()));
/// ```
#[derive(Clone, Default)]
pub struct BlobCodec<S = DefaultHashBuilder> {
    hash_builder: S,
}

impl BlobCodec<DefaultHashBuilder> {
    /// Creates a codec with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }
}

impl<S> BlobCodec<S> {
    /// Creates a codec hashing keys with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self { hash_builder }
    }

    fn block_size(key_len: usize, capacity: usize) -> Option<usize> {
        (HEADER_SIZE + DATA_OFFSET)
            .checked_add(key_len)?
            .checked_add(capacity)
    }
}

/// # Safety
///
/// `entry` must be a live blob entry.
unsafe fn field(entry: NonNull<u8>, offset: usize) -> usize {
    // SAFETY: the length fields are 4-byte aligned within the payload.
    unsafe { ptr::read(entry::payload(entry).add(offset).cast::<u32>()) as usize }
}

/// # Safety
///
/// `entry` must be a live blob entry that the caller may write.
unsafe fn set_field(entry: NonNull<u8>, offset: usize, value: u32) {
    // SAFETY: the length fields are 4-byte aligned within the payload.
    unsafe { ptr::write(entry::payload(entry).add(offset).cast::<u32>(), value) };
}

fn to_u32(size: usize) -> Result<u32, MapError> {
    u32::try_from(size).map_err(|_| MapError::InvalidLayout { size })
}

impl<S: BuildHasher + Send + Sync> Codec for BlobCodec<S> {
    type Key = [u8];
    type Value = [u8];

    fn hash(&self, key: &[u8]) -> u64 {
        self.hash_builder.hash_one(key)
    }

    unsafe fn equals_at(&self, entry: NonNull<u8>, key: &[u8]) -> bool {
        // SAFETY: caller guarantees a live entry; the key bytes follow the
        // fixed fields.
        unsafe {
            let key_len = field(entry, KEY_LEN_OFFSET);
            key_len == key.len()
                && core::slice::from_raw_parts(entry::payload(entry).add(DATA_OFFSET), key_len)
                    == key
        }
    }

    unsafe fn value_at(&self, entry: NonNull<u8>) -> Vec<u8> {
        // SAFETY: caller guarantees a live entry; value bytes follow the key.
        unsafe {
            let key_len = field(entry, KEY_LEN_OFFSET);
            let value_len = field(entry, VALUE_LEN_OFFSET);
            let value = entry::payload(entry).add(DATA_OFFSET + key_len);
            core::slice::from_raw_parts(value, value_len).to_vec()
        }
    }

    unsafe fn set_value_at(&self, entry: NonNull<u8>, value: &[u8]) {
        // SAFETY: caller guarantees the value fits the entry's capacity.
        unsafe {
            debug_assert!(value.len() <= field(entry, CAPACITY_OFFSET));
            let key_len = field(entry, KEY_LEN_OFFSET);
            let target = entry::payload(entry).add(DATA_OFFSET + key_len);
            ptr::copy_nonoverlapping(value.as_ptr(), target, value.len());
            set_field(entry, VALUE_LEN_OFFSET, value.len() as u32);
        }
    }

    fn allocate_entry<A: Allocator + ?Sized>(
        &self,
        allocator: &A,
        key: &[u8],
        _hash: u64,
        size: usize,
    ) -> Result<NonNull<u8>, MapError> {
        let key_len = to_u32(key.len())?;
        let capacity = to_u32(size)?;
        let total = Self::block_size(key.len(), size).ok_or(MapError::InvalidLayout { size })?;
        let entry = allocator.allocate(total)?;

        // SAFETY: `entry` is a fresh block of `total` bytes.
        unsafe {
            set_field(entry, KEY_LEN_OFFSET, key_len);
            set_field(entry, CAPACITY_OFFSET, capacity);
            set_field(entry, VALUE_LEN_OFFSET, 0);
            let target = entry::payload(entry).add(DATA_OFFSET);
            ptr::copy_nonoverlapping(key.as_ptr(), target, key.len());
        }
        Ok(entry)
    }

    unsafe fn destroy_entry<A: Allocator + ?Sized>(&self, allocator: &A, entry: NonNull<u8>) {
        // SAFETY: caller guarantees a live, unlinked entry from `allocator`.
        unsafe {
            let key_len = field(entry, KEY_LEN_OFFSET);
            let capacity = field(entry, CAPACITY_OFFSET);
            if let Some(total) = Self::block_size(key_len, capacity) {
                allocator.free(entry, total);
            }
        }
    }

    unsafe fn size_of_entry(&self, entry: NonNull<u8>) -> usize {
        // SAFETY: caller guarantees a live entry.
        unsafe { field(entry, CAPACITY_OFFSET) }
    }

    fn size_of_value(&self, value: &[u8]) -> usize {
        value.len()
    }

    unsafe fn key_at(&self, entry: NonNull<u8>) -> Option<Vec<u8>> {
        // SAFETY: caller guarantees a live entry.
        unsafe {
            let key_len = field(entry, KEY_LEN_OFFSET);
            let key = entry::payload(entry).add(DATA_OFFSET);
            Some(core::slice::from_raw_parts(key, key_len).to_vec())
        }
    }
}

impl<S> fmt::Debug for BlobCodec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemAllocator;

    #[test]
    fn test_blob_entry_layout() {
        let codec = BlobCodec::new();
        let allocator = SystemAllocator::new();
        let entry = codec.allocate_entry(&allocator, b"key", 0, 8).unwrap();
        assert_eq!(
            allocator.allocated_bytes(),
            HEADER_SIZE + DATA_OFFSET + 3 + 8
        );

        unsafe {
            assert!(codec.equals_at(entry, b"key"));
            assert!(!codec.equals_at(entry, b"kez"));
            assert!(!codec.equals_at(entry, b"keys"));
            assert_eq!(codec.size_of_entry(entry), 8);
            assert_eq!(codec.value_at(entry), Vec::<u8>::new());

            codec.set_value_at(entry, b"value");
            assert_eq!(codec.value_at(entry), b"value".to_vec());
            codec.set_value_at(entry, b"v");
            assert_eq!(codec.value_at(entry), b"v".to_vec());
            assert_eq!(codec.key_at(entry), Some(b"key".to_vec()));

            codec.destroy_entry(&allocator, entry);
        }
        assert_eq!(allocator.allocated_bytes(), 0);
    }

    #[test]
    fn test_blob_hash_is_stable_per_codec() {
        let codec = BlobCodec::new();
        assert_eq!(codec.hash(b"abc"), codec.hash(b"abc"));
        assert_eq!(codec.size_of_value(b"abcd"), 4);
    }
}
