//! Shard Module
//!
//! An independently locked partition of the key space.

use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::entry::{current_timestamp_ns, Entry};

/// Entries of one shard, keyed by the original string key.
///
/// Insertion-ordered so the sweeper can walk it by position and resume
/// where the previous cycle stopped.
pub type EntryMap = IndexMap<String, Entry, ahash::RandomState>;

// == Shard ==
/// A lock-guarded bucket of entries.
///
/// The lock is the only way to reach the entries, so every read and
/// mutation happens under it.
#[derive(Debug, Default)]
pub struct Shard {
    entries: RwLock<EntryMap>,
    /// Position the next sweep scan starts from
    sweep_cursor: AtomicUsize,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, EntryMap> {
        self.entries.read()
    }

    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, EntryMap> {
        self.entries.write()
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn sweep_cursor(&self) -> usize {
        self.sweep_cursor.load(Ordering::Relaxed)
    }

    // == Sweep Phase 1 ==
    /// Scans at most `scan_budget` entries from the resume cursor and
    /// collects up to `max_candidates` keys whose deadline passed before `now`.
    ///
    /// The scan wraps around the end of the map and never visits an entry
    /// twice in one call. The cursor is left after the last visited entry,
    /// so successive calls cover the whole shard. Runs under the read lock
    /// only.
    ///
    /// # Arguments
    /// * `now` - Reference time in Unix nanoseconds
    /// * `max_candidates` - Stop once this many expired keys are found
    /// * `scan_budget` - Maximum number of entries visited
    pub fn collect_expired(
        &self,
        now: u64,
        max_candidates: usize,
        scan_budget: usize,
    ) -> Vec<String> {
        let entries = self.entries.read();
        let len = entries.len();
        if len == 0 {
            self.sweep_cursor.store(0, Ordering::Relaxed);
            return Vec::new();
        }

        let start = self.sweep_cursor.load(Ordering::Relaxed) % len;
        let budget = scan_budget.min(len);
        let mut candidates = Vec::new();
        let mut visited = 0;
        while visited < budget && candidates.len() < max_candidates {
            if let Some((key, entry)) = entries.get_index((start + visited) % len) {
                if entry.is_expired_at(now) {
                    candidates.push(key.clone());
                }
            }
            visited += 1;
        }

        self.sweep_cursor.store((start + visited) % len, Ordering::Relaxed);
        candidates
    }

    // == Sweep Phase 2 ==
    /// Deletes the candidates that are still expired under the write lock.
    ///
    /// A candidate refreshed or replaced since phase 1 no longer matches and
    /// is skipped. Returns the number of entries removed.
    pub fn evict_expired(&self, candidates: &[String]) -> usize {
        if candidates.is_empty() {
            return 0;
        }
        let mut entries = self.entries.write();
        let now = current_timestamp_ns();
        let mut removed = 0;
        for key in candidates {
            if entries.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
                entries.swap_remove(key);
                removed += 1;
            }
        }
        removed
    }
}

// == Lookup Helpers ==
/// Returns the entry for `key` unless it is absent or expired.
#[inline]
pub fn live<'a>(entries: &'a EntryMap, key: &str, now: u64) -> Option<&'a Entry> {
    entries.get(key).filter(|entry| !entry.is_expired_at(now))
}

/// Mutable counterpart of [`live`].
#[inline]
pub fn live_mut<'a>(entries: &'a mut EntryMap, key: &str, now: u64) -> Option<&'a mut Entry> {
    entries.get_mut(key).filter(|entry| !entry.is_expired_at(now))
}
