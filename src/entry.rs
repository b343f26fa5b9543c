//! Off-heap Entry Layout
//!
//! Every entry is a single block obtained from an
//! [`Allocator`](crate::memory::Allocator). The first 24 bytes are a fixed
//! header owned by the map; the rest is a payload whose encoding belongs to
//! the [`Codec`](crate::codec::Codec).
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────┬────────────┬────────────┬──────────────────────────┐
//! │    hash    │    next    │    time    │         payload          │
//! │   64 bit   │  pointer   │   64 bit   │   codec-defined bytes    │
//! └────────────┴────────────┴────────────┴──────────────────────────┘
//!  0            8            16           24
//! ```
//!
//! - `hash`: the key's full hash, compared before the (costlier) key check
//! - `next`: address of the next entry in the bucket chain, or null
//! - `time`: last-touch time in milliseconds since the UNIX epoch
//!
//! # Chain Slots
//!
//! A [`Slot`] is the address of a word holding an entry pointer: either a
//! bucket in the map's bucket array or the `next` field of an entry. Structural
//! changes (insert, unlink, replace) are expressed as rewriting a slot, which
//! makes head and interior positions uniform.
//!
//! # Concurrency
//!
//! `hash` and `next` are only written while the owning segment is locked
//! exclusively. `time` is refreshed by readers that hold only a shared lock,
//! so it is always accessed through an [`AtomicU64`].

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU64, Ordering};

/// Byte offset of the hash word.
pub const HASH_OFFSET: usize = 0;
/// Byte offset of the next-entry pointer.
pub const NEXT_OFFSET: usize = 8;
/// Byte offset of the last-touch timestamp.
pub const TIME_OFFSET: usize = 16;
/// Size of the map-owned header; payloads start here.
pub const HEADER_SIZE: usize = 24;

/// Address of a word that stores an entry pointer (bucket or `next` field).
pub type Slot = *mut *mut u8;

/// Reads the entry a slot points at.
///
/// # Safety
///
/// `slot` must be a valid slot and the caller must hold the lock of the
/// segment that owns it.
#[inline]
pub unsafe fn load(slot: Slot) -> Option<NonNull<u8>> {
    // SAFETY: caller contract.
    NonNull::new(unsafe { ptr::read(slot) })
}

/// Points a slot at `entry` (or at nothing).
///
/// # Safety
///
/// `slot` must be a valid slot and the caller must hold the owning segment's
/// lock exclusively.
#[inline]
pub unsafe fn store(slot: Slot, entry: Option<NonNull<u8>>) {
    let value = entry.map_or(ptr::null_mut(), NonNull::as_ptr);
    // SAFETY: caller contract.
    unsafe { ptr::write(slot, value) };
}

/// Returns the slot formed by an entry's `next` field.
///
/// # Safety
///
/// `entry` must point at a live entry block.
#[inline]
pub unsafe fn next_slot(entry: NonNull<u8>) -> Slot {
    // SAFETY: the header lies within the entry block.
    unsafe { entry.as_ptr().add(NEXT_OFFSET).cast() }
}

/// Reads the stored hash.
///
/// # Safety
///
/// `entry` must point at a live entry block.
#[inline]
pub unsafe fn hash_at(entry: NonNull<u8>) -> u64 {
    // SAFETY: the header lies within the 8-byte aligned entry block.
    unsafe { ptr::read(entry.as_ptr().add(HASH_OFFSET).cast::<u64>()) }
}

/// Writes the stored hash.
///
/// # Safety
///
/// `entry` must point at a live entry block not yet visible to readers, or
/// its segment must be locked exclusively.
#[inline]
pub unsafe fn set_hash_at(entry: NonNull<u8>, hash: u64) {
    // SAFETY: the header lies within the 8-byte aligned entry block.
    unsafe { ptr::write(entry.as_ptr().add(HASH_OFFSET).cast::<u64>(), hash) };
}

#[inline]
unsafe fn time_cell<'a>(entry: NonNull<u8>) -> &'a AtomicU64 {
    // SAFETY: the time word is 8-byte aligned and lives as long as the entry.
    unsafe { &*entry.as_ptr().add(TIME_OFFSET).cast::<AtomicU64>() }
}

/// Reads the last-touch time in milliseconds.
///
/// # Safety
///
/// `entry` must point at a live entry block.
#[inline]
pub unsafe fn time_at(entry: NonNull<u8>) -> u64 {
    // SAFETY: caller contract.
    unsafe { time_cell(entry) }.load(Ordering::Relaxed)
}

/// Writes the last-touch time in milliseconds.
///
/// # Safety
///
/// `entry` must point at a live entry block.
#[inline]
pub unsafe fn set_time_at(entry: NonNull<u8>, time: u64) {
    // SAFETY: caller contract.
    unsafe { time_cell(entry) }.store(time, Ordering::Relaxed);
}

/// Returns the start of the codec-owned payload.
///
/// # Safety
///
/// `entry` must point at a live entry block.
#[inline]
pub unsafe fn payload(entry: NonNull<u8>) -> *mut u8 {
    // SAFETY: every entry block is at least `HEADER_SIZE` bytes.
    unsafe { entry.as_ptr().add(HEADER_SIZE) }
}
