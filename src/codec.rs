//! Key/Value Codecs
//!
//! The map core knows only the entry header. Everything about the payload
//! (how a key is hashed and compared, how a value is encoded, how big an entry
//! must be) is delegated to a [`Codec`], injected at construction.
//!
//! # Shipped Codecs
//!
//! | Type | Key | Value | Growth |
//! |------|-----|-------|--------|
//! | [`BlobCodec`] | `[u8]` | `[u8]` | values reuse the entry while they fit its capacity |
//! | [`LongCodec`] | `u64` | `u64` | fixed size, always updated in place |
//!
//! # Writing a Codec
//!
//! `allocate_entry` must return a block of at least
//! [`HEADER_SIZE`](crate::entry::HEADER_SIZE) bytes plus the payload. The map
//! fills the header itself; the codec owns everything after it. `size_of_entry`
//! and `size_of_value` must use the same unit: an update is applied in place
//! exactly when `size_of_value(new) <= size_of_entry(old)`.

use crate::error::MapError;
use crate::memory::Allocator;
use core::ptr::NonNull;

mod blob;
mod long;

pub use self::blob::BlobCodec;
pub use self::long::LongCodec;

#[cfg(feature = "hashbrown")]
pub(crate) use hashbrown::DefaultHashBuilder;

#[cfg(not(feature = "hashbrown"))]
pub(crate) use std::collections::hash_map::RandomState as DefaultHashBuilder;

/// Encoding of keys and values inside off-heap entries.
///
/// All `unsafe` methods receive an `entry` that was produced by this codec's
/// [`allocate_entry`](Codec::allocate_entry) and is still live; the map calls
/// them only while holding the entry's segment lock.
pub trait Codec: Send + Sync {
    /// Key type. Lookups borrow it; records may need an owned copy.
    type Key: ?Sized + ToOwned;
    /// Value type. Writes borrow it; reads decode an owned copy.
    type Value: ?Sized + ToOwned;

    /// Hashes a key. Low 16 bits pick the segment, the rest pick the bucket.
    fn hash(&self, key: &Self::Key) -> u64;

    /// Returns whether the entry's key equals `key`.
    ///
    /// # Safety
    ///
    /// `entry` must be a live entry of this codec.
    unsafe fn equals_at(&self, entry: NonNull<u8>, key: &Self::Key) -> bool;

    /// Decodes the entry's value.
    ///
    /// # Safety
    ///
    /// `entry` must be a live entry of this codec.
    unsafe fn value_at(&self, entry: NonNull<u8>) -> <Self::Value as ToOwned>::Owned;

    /// Encodes `value` into the entry.
    ///
    /// # Safety
    ///
    /// `entry` must be a live entry of this codec, locked exclusively, and
    /// `size_of_value(value) <= size_of_entry(entry)`.
    unsafe fn set_value_at(&self, entry: NonNull<u8>, value: &Self::Value);

    /// Allocates an entry for `key` with room for a value of `size`.
    ///
    /// The returned block must have its key encoded; header and value are
    /// written by the map.
    fn allocate_entry<A: Allocator + ?Sized>(
        &self,
        allocator: &A,
        key: &Self::Key,
        hash: u64,
        size: usize,
    ) -> Result<NonNull<u8>, MapError>;

    /// Releases an entry back to `allocator`.
    ///
    /// # Safety
    ///
    /// `entry` must be a live entry of this codec allocated from `allocator`
    /// and already unlinked from every chain.
    unsafe fn destroy_entry<A: Allocator + ?Sized>(&self, allocator: &A, entry: NonNull<u8>);

    /// Value capacity of an existing entry.
    ///
    /// # Safety
    ///
    /// `entry` must be a live entry of this codec.
    unsafe fn size_of_entry(&self, entry: NonNull<u8>) -> usize;

    /// Space `value` needs, in the unit of [`size_of_entry`](Codec::size_of_entry).
    fn size_of_value(&self, value: &Self::Value) -> usize;

    /// Recovers the key of an entry, if the encoding keeps it.
    ///
    /// Only iteration needs this; the default returns `None`.
    ///
    /// # Safety
    ///
    /// `entry` must be a live entry of this codec.
    unsafe fn key_at(&self, entry: NonNull<u8>) -> Option<<Self::Key as ToOwned>::Owned> {
        let _ = entry;
        None
    }
}
