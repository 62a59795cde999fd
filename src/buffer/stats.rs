//! Bucket cache statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a [`BucketCache`](super::BucketCache).
///
/// All fields are atomic so guards on different threads can bump them
/// without taking a lock. `Ordering::Relaxed` is enough: counters are
/// independent and only ever read as a snapshot.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Fetches served from a resident frame.
    pub cache_hits: AtomicU64,

    /// Fetches that had to decode a bucket from the file.
    pub cache_misses: AtomicU64,

    /// Buckets pushed out of the cache to make room.
    pub evictions: AtomicU64,

    /// Buckets read and decoded from the file.
    pub buckets_read: AtomicU64,

    /// Buckets encoded and written to the file.
    pub buckets_written: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    /// Non-atomic copy for display and logging.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            buckets_read: self.buckets_read.load(Ordering::Relaxed),
            buckets_written: self.buckets_written.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.cache_hits,
            &self.cache_misses,
            &self.evictions,
            &self.buckets_read,
            &self.buckets_written,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub buckets_read: u64,
    pub buckets_written: u64,
}

impl StatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits: {}, misses: {}, evictions: {}, read: {}, written: {}, hit_rate: {:.2}%",
            self.cache_hits,
            self.cache_misses,
            self.evictions,
            self.buckets_read,
            self.buckets_written,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_hit_rate() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.cache_hits.fetch_add(3, Ordering::Relaxed);
        CacheStats::bump(&stats.cache_misses);
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_stats_reset() {
        let stats = CacheStats::new();
        CacheStats::bump(&stats.buckets_written);
        CacheStats::bump(&stats.evictions);
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_stats_display() {
        let stats = CacheStats::new();
        stats.cache_hits.fetch_add(80, Ordering::Relaxed);
        stats.cache_misses.fetch_add(20, Ordering::Relaxed);

        let display = stats.snapshot().to_string();
        assert!(display.contains("hits: 80"));
        assert!(display.contains("80.00%"));
    }
}
