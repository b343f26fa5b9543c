//! Segment Lock Array
//!
//! A fixed array of [`CONCURRENCY_LEVEL`] independent read/write locks. A key's
//! segment is chosen by the low bits of its hash, and since the bucket count
//! is always a multiple of the segment count, segment `s` owns exactly the
//! buckets `s, s + 65536, s + 2 * 65536, ...`.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │  hash & 0xFFFF  ──▶  Segment Selection                             │
//! │                                                                    │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐     ┌──────────┐           │
//! │  │ RwLock 0 │ │ RwLock 1 │ │ RwLock 2 │ ... │RwLock 65535          │
//! │  └────┬─────┘ └────┬─────┘ └────┬─────┘     └────┬─────┘           │
//! │       ▼            ▼            ▼                ▼                 │
//! │  buckets 0,     buckets 1,   buckets 2,      buckets 65535,        │
//! │  65536, ...     65537, ...   65538, ...      131071, ...           │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are `parking_lot::RwLock<()>`: the data they guard lives off-heap,
//! so the lock only carries ordering. Guards release on drop.

use crate::error::MapError;
use core::fmt;
use core::time::Duration;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of lock segments. Must be a power of two.
pub const CONCURRENCY_LEVEL: usize = 65536;

const SEGMENT_MASK: u64 = (CONCURRENCY_LEVEL - 1) as u64;

/// Fixed set of striped read/write locks.
pub struct SegmentLocks {
    locks: Box<[RwLock<()>]>,
}

impl SegmentLocks {
    /// Creates [`CONCURRENCY_LEVEL`] unlocked segments.
    pub fn new() -> Self {
        let locks = (0..CONCURRENCY_LEVEL).map(|_| RwLock::new(())).collect();
        Self { locks }
    }

    /// Returns the segment that guards keys with the given hash.
    #[inline]
    pub fn segment_for(hash: u64) -> usize {
        (hash & SEGMENT_MASK) as usize
    }

    /// Returns the segment that owns the given bucket index.
    #[inline]
    pub fn segment_of_bucket(index: usize) -> usize {
        index & (CONCURRENCY_LEVEL - 1)
    }

    /// Number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Always false; present for API symmetry with `len`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Blocks until the segment can be read-locked.
    #[inline]
    pub fn read(&self, segment: usize) -> RwLockReadGuard<'_, ()> {
        self.locks[segment].read()
    }

    /// Blocks until the segment can be write-locked.
    #[inline]
    pub fn write(&self, segment: usize) -> RwLockWriteGuard<'_, ()> {
        self.locks[segment].write()
    }

    /// Read-locks the segment, giving up after `timeout`.
    pub fn try_read_for(
        &self,
        segment: usize,
        timeout: Duration,
    ) -> Result<RwLockReadGuard<'_, ()>, MapError> {
        self.locks[segment]
            .try_read_for(timeout)
            .ok_or(MapError::Timeout)
    }

    /// Write-locks the segment, giving up after `timeout`.
    pub fn try_write_for(
        &self,
        segment: usize,
        timeout: Duration,
    ) -> Result<RwLockWriteGuard<'_, ()>, MapError> {
        self.locks[segment]
            .try_write_for(timeout)
            .ok_or(MapError::Timeout)
    }
}

impl Default for SegmentLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SegmentLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentLocks")
            .field("segments", &self.locks.len())
            .finish()
    }
}
