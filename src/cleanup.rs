//! Background Cleanup
//!
//! Expired entries stay in the map until a sweep removes them. A [`Sweeper`]
//! decides what one sweep removes; a [`CleanupThread`] runs a sweeper
//! periodically on its own thread.
//!
//! | Sweeper | Removes | Cost |
//! |---------|---------|------|
//! | [`BasicSweeper`] | entries older than `time_to_live` | one pass over every bucket |
//! | [`SamplingSweeper`] | roughly the oldest entries above the occupancy target | sampling plus one pass |
//!
//! Sweeps lock each segment with a bounded wait and skip busy segments, so
//! they never stall lookups for long.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use offheap_map::cleanup::{CleanupThread, SamplingSweeper};
//! use offheap_map::{LongCodec, OffheapMap, OffheapMapConfig};
//!
//! let config = OffheapMapConfig::new(1).with_cleanup_threshold(0.2);
//! let map = Arc::new(OffheapMap::new(config, LongCodec::new()).unwrap());
//!
//! let cleanup = CleanupThread::spawn("map-cleanup", Arc::clone(&map), SamplingSweeper::new()).unwrap();
//! map.put(&1, &1).unwrap();
//! cleanup.force();
//! cleanup.stop();
//! ```

use crate::codec::Codec;
use crate::map::OffheapMap;
use crate::memory::Allocator;

mod sampling;
mod thread;

pub use self::sampling::SamplingSweeper;
pub use self::thread::CleanupThread;

/// One cleanup strategy.
pub trait Sweeper {
    /// Runs one sweep over `map` and returns the number of entries removed.
    fn sweep<C: Codec, A: Allocator>(&mut self, map: &OffheapMap<C, A>) -> usize;
}

/// Removes every entry older than the map's `time_to_live`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicSweeper;

impl BasicSweeper {
    /// Creates a TTL sweeper.
    pub fn new() -> Self {
        Self
    }
}

impl Sweeper for BasicSweeper {
    fn sweep<C: Codec, A: Allocator>(&mut self, map: &OffheapMap<C, A>) -> usize {
        map.remove_expired(map.settings().time_to_live())
    }
}
