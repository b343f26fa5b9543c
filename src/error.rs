//! Errors returned to callers of the map.
//!
//! A key that is not present is never an error: lookups report it as `None`
//! or `false`. Only structural failures surface here.

use thiserror::Error;

/// Possible errors returned by [`OffheapMap`](crate::OffheapMap) and its
/// record handles.
#[derive(Error, Debug, PartialEq, Eq, Copy, Clone)]
pub enum MapError {
    /// The allocator could not supply a block of the requested size.
    #[error("out of memory ({size} bytes requested)")]
    OutOfMemory {
        /// Size of the failed request in bytes.
        size: usize,
    },
    /// A bounded lock acquisition did not succeed in time.
    #[error("timed out waiting for segment lock")]
    Timeout,
    /// A writable record had to allocate a new entry but has no key to
    /// build it from.
    #[error("record has no key to allocate an entry with")]
    MissingKey,
    /// The requested size cannot be expressed as an allocation layout.
    #[error("invalid allocation layout ({size} bytes)")]
    InvalidLayout {
        /// Size of the rejected request in bytes.
        size: usize,
    },
}
