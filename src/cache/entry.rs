//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ahash::HashSet;

use crate::cache::Value;

// == Entry Kind ==
/// Discriminates scalar entries from set entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Scalar,
    Set,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Scalar => "scalar",
            EntryKind::Set => "set",
        }
    }
}

// == Payload ==
/// What an entry holds.
#[derive(Debug, Clone)]
pub enum Payload {
    Scalar(Value),
    /// Member string representations; unique, unordered
    Set(HashSet<String>),
}

// == Ttl ==
/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key never expires
    Persistent,
    /// The key expires after the contained duration
    Expires(Duration),
}

impl Ttl {
    /// Remaining whole seconds, or `-1` for a persistent key.
    pub fn as_secs(&self) -> i64 {
        match self {
            Ttl::Persistent => -1,
            Ttl::Expires(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        }
    }
}

// == Cache Entry ==
/// A single stored unit: payload plus absolute expiry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub payload: Payload,
    /// Expiration timestamp (Unix nanoseconds), 0 = never expires
    pub expire_at: u64,
}

impl Entry {
    // == Constructors ==
    /// Creates a scalar entry; a zero `ttl` never expires.
    pub fn scalar(value: Value, ttl: Duration) -> Self {
        Self {
            payload: Payload::Scalar(value),
            expire_at: deadline(ttl),
        }
    }

    /// Creates an empty, persistent set entry.
    pub fn set() -> Self {
        Self {
            payload: Payload::Set(HashSet::default()),
            expire_at: 0,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self.payload {
            Payload::Scalar(_) => EntryKind::Scalar,
            Payload::Set(_) => EntryKind::Set,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired relative to `now` (Unix nanoseconds).
    ///
    /// An entry is expired once `now >= expire_at`.
    #[inline]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expire_at != 0 && now >= self.expire_at
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, clamped to zero once elapsed.
    pub fn ttl(&self) -> Ttl {
        if self.expire_at == 0 {
            return Ttl::Persistent;
        }
        let now = current_timestamp_ns();
        Ttl::Expires(Duration::from_nanos(self.expire_at.saturating_sub(now)))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in nanoseconds.
pub fn current_timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Absolute deadline for `ttl` from now; zero means no deadline.
pub fn deadline(ttl: Duration) -> u64 {
    if ttl.is_zero() {
        return 0;
    }
    let ttl_ns = u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX);
    current_timestamp_ns().saturating_add(ttl_ns).max(1)
}
