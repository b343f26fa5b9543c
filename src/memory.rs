//! Raw Memory Allocators
//!
//! The map never touches Rust-managed values for its storage: the bucket array
//! and every entry are blocks obtained from an [`Allocator`] and released back
//! to it explicitly. Two implementations ship with the crate:
//!
//! | Type | Behavior |
//! |------|----------|
//! | [`SystemAllocator`] | Delegates to the global allocator, fails only when it does |
//! | [`BoundedAllocator`] | Wraps another allocator and fails once a byte budget is spent |
//!
//! All blocks are 8-byte aligned so entry headers can be read as words.

use crate::error::MapError;
use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::alloc::{self, Layout};
use std::sync::Arc;

/// Alignment of every block handed out by the shipped allocators.
pub const BLOCK_ALIGN: usize = 8;

/// Source of raw, manually managed memory.
///
/// Implementations must be thread-safe: entries are allocated and freed from
/// whichever thread holds the owning segment lock.
pub trait Allocator: Send + Sync {
    /// Allocates `size` bytes aligned to [`BLOCK_ALIGN`].
    ///
    /// The contents of the returned block are unspecified.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, MapError>;

    /// Allocates `size` bytes and fills them with zeroes.
    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        let block = self.allocate(size)?;
        // SAFETY: `block` was just allocated with room for `size` bytes.
        unsafe { ptr::write_bytes(block.as_ptr(), 0, size) };
        Ok(block)
    }

    /// Returns a block to the allocator.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by this allocator for a request of
    /// exactly `size` bytes and must not be used afterwards.
    unsafe fn free(&self, block: NonNull<u8>, size: usize);

    /// Number of bytes currently handed out.
    fn allocated_bytes(&self) -> usize;
}

macro_rules! forward_allocator {
    ($($wrapper:ty),*) => {$(
        impl<A: Allocator + ?Sized> Allocator for $wrapper {
            #[inline]
            fn allocate(&self, size: usize) -> Result<NonNull<u8>, MapError> {
                (**self).allocate(size)
            }

            #[inline]
            fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>, MapError> {
                (**self).allocate_zeroed(size)
            }

            #[inline]
            unsafe fn free(&self, block: NonNull<u8>, size: usize) {
                // SAFETY: forwarded caller contract.
                unsafe { (**self).free(block, size) }
            }

            #[inline]
            fn allocated_bytes(&self) -> usize {
                (**self).allocated_bytes()
            }
        }
    )*};
}

// a shared allocator can back several maps
forward_allocator!(&A, Arc<A>);

fn layout_for(size: usize) -> Result<Layout, MapError> {
    // zero-sized requests still get a unique block
    Layout::from_size_align(size.max(1), BLOCK_ALIGN).map_err(|_| MapError::InvalidLayout { size })
}

/// Allocator backed by the process-wide global allocator.
#[derive(Default)]
pub struct SystemAllocator {
    allocated: AtomicUsize,
}

impl SystemAllocator {
    /// Creates a new system allocator with no outstanding blocks.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        let layout = layout_for(size)?;
        // SAFETY: `layout` has a non-zero size.
        let block = unsafe { alloc::alloc(layout) };
        let block = NonNull::new(block).ok_or(MapError::OutOfMemory { size })?;
        self.allocated.fetch_add(size, Ordering::Relaxed);
        Ok(block)
    }

    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        let layout = layout_for(size)?;
        // SAFETY: `layout` has a non-zero size.
        let block = unsafe { alloc::alloc_zeroed(layout) };
        let block = NonNull::new(block).ok_or(MapError::OutOfMemory { size })?;
        self.allocated.fetch_add(size, Ordering::Relaxed);
        Ok(block)
    }

    unsafe fn free(&self, block: NonNull<u8>, size: usize) {
        // The layout was valid when the block was handed out.
        if let Ok(layout) = layout_for(size) {
            // SAFETY: the caller guarantees `block` came from this allocator
            // with the same size, hence the same layout.
            unsafe { alloc::dealloc(block.as_ptr(), layout) };
            self.allocated.fetch_sub(size, Ordering::Relaxed);
        }
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for SystemAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemAllocator")
            .field("allocated", &self.allocated_bytes())
            .finish()
    }
}

/// Allocator that refuses requests once `limit` bytes are outstanding.
///
/// This mirrors a fixed-size memory region: once the budget is spent, puts
/// fail with [`MapError::OutOfMemory`] until cleanup frees enough entries.
///
/// # Examples
///
/// ```
/// use offheap_map::memory::{Allocator, BoundedAllocator};
///
/// let allocator = BoundedAllocator::new(64);
/// let block = allocator.allocate(48).unwrap();
/// assert!(allocator.allocate(32).is_err());
/// unsafe { allocator.free(block, 48) };
/// assert_eq!(allocator.allocated_bytes(), 0);
/// ```
pub struct BoundedAllocator<A = SystemAllocator> {
    inner: A,
    limit: usize,
    used: AtomicUsize,
}

impl BoundedAllocator<SystemAllocator> {
    /// Creates a bounded allocator over the global allocator.
    pub fn new(limit: usize) -> Self {
        Self::with_inner(SystemAllocator::new(), limit)
    }
}

impl<A: Allocator> BoundedAllocator<A> {
    /// Creates a bounded allocator drawing its blocks from `inner`.
    pub fn with_inner(inner: A, limit: usize) -> Self {
        Self {
            inner,
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Returns the byte budget.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of bytes still available.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used.load(Ordering::Relaxed))
    }

    fn reserve(&self, size: usize) -> Result<(), MapError> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&total| total <= self.limit)
            })
            .map(|_| ())
            .map_err(|_| MapError::OutOfMemory { size })
    }

    fn unreserve(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::AcqRel);
    }
}

impl<A: Allocator> Allocator for BoundedAllocator<A> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        self.reserve(size)?;
        self.inner.allocate(size).map_err(|err| {
            self.unreserve(size);
            err
        })
    }

    fn allocate_zeroed(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        self.reserve(size)?;
        self.inner.allocate_zeroed(size).map_err(|err| {
            self.unreserve(size);
            err
        })
    }

    unsafe fn free(&self, block: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.free(block, size) };
        self.unreserve(size);
    }

    fn allocated_bytes(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }
}

impl<A> fmt::Debug for BoundedAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedAllocator")
            .field("limit", &self.limit)
            .field("used", &self.used.load(Ordering::Relaxed))
            .finish()
    }
}
