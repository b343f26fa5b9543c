#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          OffheapMap<C, A>                            │
//! │                                                                      │
//! │  ┌──────────────┐   ┌──────────────────────┐   ┌──────────────────┐  │
//! │  │ SegmentLocks │   │ bucket array         │   │ Settings         │  │
//! │  │ 65536 RwLock │   │ capacity × pointer   │   │ ttl, threshold,  │  │
//! │  └──────────────┘   └──────────┬───────────┘   │ samples, ...     │  │
//! │                                │               └──────────────────┘  │
//! │                                ▼                                     │
//! │              ┌────────────────────────────────┐                      │
//! │              │ entry: hash │ next │ time │ .. │ ◀── Codec C          │
//! │              └────────────────────────────────┘ ◀── Allocator A      │
//! └──────────────────────────────────────────────────────────────────────┘
//!            ▲                                     ▲
//!            │ Record / WritableRecord             │ Sweeper
//!            │ (segment lock guards)               │ (CleanupThread)
//! ```
//!
//! ## Quick Reference
//!
//! | Type | Role |
//! |------|------|
//! | [`OffheapMap`] | the table: get, put, remove, iterate, expire |
//! | [`BlobCodec`], [`LongCodec`] | shipped key/value encodings |
//! | [`OffheapMapConfig`] | construction parameters |
//! | [`Record`], [`WritableRecord`] | entries pinned by a held segment lock |
//! | [`CleanupThread`] | periodic sweeper thread |
//! | [`BasicSweeper`], [`SamplingSweeper`] | TTL and occupancy-driven cleanup |
//!
//! ## Record Handles
//!
//! ```rust
//! use offheap_map::{BlobCodec, OffheapMap, OffheapMapConfig};
//!
//! let map = OffheapMap::new(OffheapMapConfig::new(1), BlobCodec::new()).unwrap();
//!
//! // read-modify-write under one exclusive lock
//! let mut record = map.lock_record_for_write(b"counter", true).unwrap();
//! let next = match record.value() {
//!     Some(bytes) => bytes[0] + 1,
//!     None => 1,
//! };
//! record.set_value(&[next]).unwrap();
//! drop(record);
//!
//! assert_eq!(map.get(b"counter"), Some(vec![1]));
//! ```
//!
//! ## Iteration
//!
//! ```rust
//! use offheap_map::{LongCodec, OffheapMap, OffheapMapConfig};
//!
//! let map = OffheapMap::new(OffheapMapConfig::new(1), LongCodec::new()).unwrap();
//! for key in 0..100u64 {
//!     map.put(&key, &key).unwrap();
//! }
//!
//! // drop every odd value
//! map.iterate_mut(|record| {
//!     if record.value().is_some_and(|value| value % 2 == 1) {
//!         record.remove();
//!     }
//! });
//! assert_eq!(map.len(), 50);
//! ```
//!
//! ## Modules
//!
//! - [`map`]: the hash table
//! - [`record`]: lock-holding record handles
//! - [`codec`]: key/value encodings
//! - [`memory`]: raw allocators
//! - [`config`]: construction and runtime settings
//! - [`cleanup`]: sweepers and the cleanup thread
//! - [`metrics`]: metrics reporting
//! - [`select`]: order statistics used by sampling cleanup
//! - [`parallel`]: fork/join helper used by parallel iteration

/// Off-heap entry header layout.
///
/// Constants and raw accessors for the 24-byte header the map keeps in front
/// of every entry.
pub mod entry;

/// Wall-clock helper.
pub mod clock;

/// Error type.
pub mod error;

/// Raw memory allocators.
///
/// Provides the [`Allocator`](memory::Allocator) trait and its system and
/// bounded implementations.
pub mod memory;

/// Striped segment locks.
pub mod segment;

/// Key/value codecs.
///
/// Encodes keys and values into entry payloads.
pub mod codec;

/// Map configuration.
pub mod config;

/// The off-heap hash table.
pub mod map;

/// Record handles holding a segment lock.
pub mod record;

/// Quickselect over timestamps.
pub mod select;

/// Indexed fork/join.
pub mod parallel;

/// Background cleanup.
///
/// Provides the [`Sweeper`](cleanup::Sweeper) strategies and the thread that
/// runs them.
pub mod cleanup;

/// Metrics reporting.
pub mod metrics;

pub use cleanup::{BasicSweeper, CleanupThread, SamplingSweeper, Sweeper};
pub use codec::{BlobCodec, Codec, LongCodec};
pub use config::{OffheapMapConfig, Settings};
pub use error::MapError;
pub use map::OffheapMap;
pub use memory::{Allocator, BoundedAllocator, SystemAllocator};
pub use metrics::{CacheMetrics, MapMetrics};
pub use record::{Record, WritableRecord};
