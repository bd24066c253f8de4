//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and reclaimed entries.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of expired entries reclaimed by the sweeper
    pub expired_reclaimed: u64,
    /// Number of completed sweep cycles
    pub sweeps: u64,
    /// Current number of stored entries (including not yet reclaimed ones)
    pub total_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Counters ==
/// Live counters shared by every handle of a cache.
#[derive(Debug, Default)]
pub struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired_reclaimed: AtomicU64,
    sweeps: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one finished sweep cycle that reclaimed `removed` entries.
    pub fn record_sweep(&self, removed: usize) {
        self.expired_reclaimed
            .fetch_add(removed as u64, Ordering::Relaxed);
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, total_entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_reclaimed: self.expired_reclaimed.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            total_entries,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsCounters::new().snapshot(0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.expired_reclaimed, 0);
        assert_eq!(stats.sweeps, 0);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counters = StatsCounters::new();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        assert_eq!(counters.snapshot(0).hit_rate(), 0.75);
    }

    #[test]
    fn test_record_sweep() {
        let counters = StatsCounters::new();
        counters.record_sweep(3);
        counters.record_sweep(0);
        let stats = counters.snapshot(7);
        assert_eq!(stats.expired_reclaimed, 3);
        assert_eq!(stats.sweeps, 2);
        assert_eq!(stats.total_entries, 7);
    }

    #[test]
    fn test_stats_serialize() {
        let json = serde_json::to_value(StatsCounters::new().snapshot(2)).unwrap();
        assert_eq!(json["total_entries"], 2);
        assert_eq!(json["hits"], 0);
    }
}
