//! Map Configuration
//!
//! Two types split the knobs by when they may change:
//!
//! | Type | When | Contents |
//! |------|------|----------|
//! | [`OffheapMapConfig`] | construction | capacity plus initial tunables |
//! | [`Settings`] | any time | tunables read by lookups and cleanup |
//!
//! The bucket count is fixed for the lifetime of a map, so it only appears in
//! [`OffheapMapConfig`]. Everything else is copied into a [`Settings`] that the
//! map owns and that can be adjusted while other threads use the map.
//!
//! # Defaults
//!
//! | Setting | Default | Unit |
//! |---------|---------|------|
//! | `time_to_live` | `u64::MAX` (never expire) | ms |
//! | `min_time_to_live` | `0` | ms |
//! | `lock_wait_time` | `10` | ms |
//! | `cleanup_interval` | `60000` | ms |
//! | `cleanup_threshold` | `0.1` | fraction of capacity |
//! | `max_samples` | `1000` | timestamps |
//!
//! # Examples
//!
//! ```
//! use offheap_map::config::OffheapMapConfig;
//!
//! let config = OffheapMapConfig::new(1_000_000)
//!     .with_time_to_live(30_000)
//!     .with_cleanup_threshold(0.2);
//! assert_eq!(config.time_to_live(), 30_000);
//! ```

use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;

const DEFAULT_TIME_TO_LIVE: u64 = u64::MAX;
const DEFAULT_MIN_TIME_TO_LIVE: u64 = 0;
const DEFAULT_LOCK_WAIT_TIME: u64 = 10;
const DEFAULT_CLEANUP_INTERVAL: u64 = 60_000;
const DEFAULT_CLEANUP_THRESHOLD: f64 = 0.1;
const DEFAULT_MAX_SAMPLES: usize = 1000;

fn check_threshold(threshold: f64) {
    assert!(
        (0.0..=1.0).contains(&threshold),
        "cleanup threshold must be within 0.0..=1.0"
    );
}

/// Construction-time configuration of an [`OffheapMap`](crate::OffheapMap).
///
/// # Required Parameters
///
/// - `capacity`: requested number of buckets, rounded up by the map to a
///   multiple of [`CONCURRENCY_LEVEL`](crate::segment::CONCURRENCY_LEVEL)
///
/// # Optional Parameters (Builder Methods)
///
/// - `time_to_live`: age after which an entry reads as absent
/// - `min_time_to_live`: floor for the age picked by sampling cleanup
/// - `lock_wait_time`: how long cleanup waits for a segment lock
/// - `cleanup_interval`: period of the background cleanup thread
/// - `cleanup_threshold`: free fraction of capacity that cleanup maintains
/// - `max_samples`: timestamps collected per sampling sweep
#[derive(Clone, Copy)]
pub struct OffheapMapConfig {
    capacity: usize,
    time_to_live: u64,
    min_time_to_live: u64,
    lock_wait_time: u64,
    cleanup_interval: u64,
    cleanup_threshold: f64,
    max_samples: usize,
}

impl OffheapMapConfig {
    /// Creates a configuration for `capacity` buckets with default tunables.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            time_to_live: DEFAULT_TIME_TO_LIVE,
            min_time_to_live: DEFAULT_MIN_TIME_TO_LIVE,
            lock_wait_time: DEFAULT_LOCK_WAIT_TIME,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    /// Sets the entry time-to-live in milliseconds.
    #[must_use]
    pub fn with_time_to_live(mut self, millis: u64) -> Self {
        self.time_to_live = millis;
        self
    }

    /// Sets the minimum age, in milliseconds, that sampling cleanup evicts.
    #[must_use]
    pub fn with_min_time_to_live(mut self, millis: u64) -> Self {
        self.min_time_to_live = millis;
        self
    }

    /// Sets how long cleanup waits for each segment lock, in milliseconds.
    #[must_use]
    pub fn with_lock_wait_time(mut self, millis: u64) -> Self {
        self.lock_wait_time = millis;
        self
    }

    /// Sets the background cleanup period in milliseconds.
    #[must_use]
    pub fn with_cleanup_interval(mut self, millis: u64) -> Self {
        self.cleanup_interval = millis;
        self
    }

    /// Sets the fraction of capacity that cleanup tries to keep free.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is outside `0.0..=1.0`.
    #[must_use]
    pub fn with_cleanup_threshold(mut self, threshold: f64) -> Self {
        check_threshold(threshold);
        self.cleanup_threshold = threshold;
        self
    }

    /// Sets the number of timestamps a sampling sweep collects.
    #[must_use]
    pub fn with_max_samples(mut self, samples: usize) -> Self {
        self.max_samples = samples;
        self
    }

    /// Returns the requested capacity, before rounding.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the entry time-to-live in milliseconds.
    #[inline]
    pub fn time_to_live(&self) -> u64 {
        self.time_to_live
    }

    /// Returns the minimum eviction age in milliseconds.
    #[inline]
    pub fn min_time_to_live(&self) -> u64 {
        self.min_time_to_live
    }

    /// Returns the cleanup lock wait in milliseconds.
    #[inline]
    pub fn lock_wait_time(&self) -> u64 {
        self.lock_wait_time
    }

    /// Returns the cleanup period in milliseconds.
    #[inline]
    pub fn cleanup_interval(&self) -> u64 {
        self.cleanup_interval
    }

    /// Returns the cleanup threshold.
    #[inline]
    pub fn cleanup_threshold(&self) -> f64 {
        self.cleanup_threshold
    }

    /// Returns the sample budget of a sampling sweep.
    #[inline]
    pub fn max_samples(&self) -> usize {
        self.max_samples
    }
}

impl fmt::Debug for OffheapMapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffheapMapConfig")
            .field("capacity", &self.capacity)
            .field("time_to_live", &self.time_to_live)
            .field("min_time_to_live", &self.min_time_to_live)
            .field("lock_wait_time", &self.lock_wait_time)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("cleanup_threshold", &self.cleanup_threshold)
            .field("max_samples", &self.max_samples)
            .finish()
    }
}

/// Tunables of a live map.
///
/// Each value is an independent atomic, so setters may race with lookups and
/// sweeps; a sweep that is already running may see either the old or the new
/// value.
pub struct Settings {
    time_to_live: AtomicU64,
    min_time_to_live: AtomicU64,
    lock_wait_time: AtomicU64,
    cleanup_interval: AtomicU64,
    // f64 bits
    cleanup_threshold: AtomicU64,
    max_samples: AtomicUsize,
}

impl Settings {
    /// Returns the entry time-to-live in milliseconds.
    pub fn time_to_live(&self) -> u64 {
        self.time_to_live.load(Ordering::Relaxed)
    }

    /// Sets the entry time-to-live in milliseconds.
    pub fn set_time_to_live(&self, millis: u64) {
        self.time_to_live.store(millis, Ordering::Relaxed);
    }

    /// Returns the minimum eviction age in milliseconds.
    pub fn min_time_to_live(&self) -> u64 {
        self.min_time_to_live.load(Ordering::Relaxed)
    }

    /// Sets the minimum eviction age in milliseconds.
    pub fn set_min_time_to_live(&self, millis: u64) {
        self.min_time_to_live.store(millis, Ordering::Relaxed);
    }

    /// Returns the cleanup lock wait in milliseconds.
    pub fn lock_wait_time(&self) -> u64 {
        self.lock_wait_time.load(Ordering::Relaxed)
    }

    /// Sets the cleanup lock wait in milliseconds.
    pub fn set_lock_wait_time(&self, millis: u64) {
        self.lock_wait_time.store(millis, Ordering::Relaxed);
    }

    /// Returns the cleanup lock wait as a [`Duration`].
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_time())
    }

    /// Returns the cleanup period in milliseconds.
    pub fn cleanup_interval(&self) -> u64 {
        self.cleanup_interval.load(Ordering::Relaxed)
    }

    /// Sets the cleanup period in milliseconds.
    pub fn set_cleanup_interval(&self, millis: u64) {
        self.cleanup_interval.store(millis, Ordering::Relaxed);
    }

    /// Returns the cleanup period as a [`Duration`].
    pub fn cleanup_interval_duration(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval())
    }

    /// Returns the fraction of capacity that cleanup tries to keep free.
    pub fn cleanup_threshold(&self) -> f64 {
        f64::from_bits(self.cleanup_threshold.load(Ordering::Relaxed))
    }

    /// Sets the fraction of capacity that cleanup tries to keep free.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is outside `0.0..=1.0`.
    pub fn set_cleanup_threshold(&self, threshold: f64) {
        check_threshold(threshold);
        self.cleanup_threshold
            .store(threshold.to_bits(), Ordering::Relaxed);
    }

    /// Returns the sample budget of a sampling sweep.
    pub fn max_samples(&self) -> usize {
        self.max_samples.load(Ordering::Relaxed)
    }

    /// Sets the sample budget of a sampling sweep.
    pub fn set_max_samples(&self, samples: usize) {
        self.max_samples.store(samples, Ordering::Relaxed);
    }
}

impl From<&OffheapMapConfig> for Settings {
    fn from(config: &OffheapMapConfig) -> Self {
        Self {
            time_to_live: AtomicU64::new(config.time_to_live),
            min_time_to_live: AtomicU64::new(config.min_time_to_live),
            lock_wait_time: AtomicU64::new(config.lock_wait_time),
            cleanup_interval: AtomicU64::new(config.cleanup_interval),
            cleanup_threshold: AtomicU64::new(config.cleanup_threshold.to_bits()),
            max_samples: AtomicUsize::new(config.max_samples),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("time_to_live", &self.time_to_live())
            .field("min_time_to_live", &self.min_time_to_live())
            .field("lock_wait_time", &self.lock_wait_time())
            .field("cleanup_interval", &self.cleanup_interval())
            .field("cleanup_threshold", &self.cleanup_threshold())
            .field("max_samples", &self.max_samples())
            .finish()
    }
}
