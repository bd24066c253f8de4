//! Cache Store Module
//!
//! Main cache engine: routes every key to one independently locked shard and
//! implements scalar, set, counter and TTL operations on top of it.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use ahash::HashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::cache::entry::{current_timestamp_ns, deadline, Entry, EntryKind, Payload, Ttl};
use crate::cache::shard::{live, live_mut, Shard};
use crate::cache::{CacheStats, FromValue, KeyHasher, StatsCounters, Value};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweeper;

struct Inner {
    shards: Box<[Shard]>,
    shard_mask: u64,
    hasher: KeyHasher,
    stats: StatsCounters,
    sweep_max_evictions: usize,
    sweep_scan_budget: usize,
    closed: AtomicBool,
    /// Shutdown signal of the running sweeper, if any
    sweeper: Mutex<Option<watch::Sender<bool>>>,
}

// == Sharded Cache ==
/// Sharded in-process cache with TTL, set and counter support.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct ShardedCache {
    inner: Arc<Inner>,
}

/// Non-owning handle held by the background sweeper.
#[derive(Clone)]
pub struct WeakShardedCache {
    inner: Weak<Inner>,
}

impl WeakShardedCache {
    pub fn upgrade(&self) -> Option<ShardedCache> {
        self.inner.upgrade().map(|inner| ShardedCache { inner })
    }
}

impl fmt::Debug for ShardedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedCache")
            .field("shards", &self.inner.shards.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ShardedCache {
    // == Constructors ==
    /// Creates a cache without a background sweeper.
    ///
    /// Expired entries are still hidden from every read; they are only
    /// reclaimed when overwritten or by [`ShardedCache::sweep_now`].
    pub fn new(config: &Config) -> Result<Self> {
        let shard_count = config.resolved_shard_count()?;
        let shards = (0..shard_count).map(|_| Shard::new()).collect();

        Ok(Self {
            inner: Arc::new(Inner {
                shards,
                shard_mask: shard_count as u64 - 1,
                hasher: KeyHasher::new(),
                stats: StatsCounters::new(),
                sweep_max_evictions: config.sweep_max_evictions.max(1),
                sweep_scan_budget: config.sweep_scan_budget.max(1),
                closed: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        })
    }

    /// Creates a cache and starts its sweeper on the current tokio runtime.
    pub fn open(config: &Config) -> Result<Self> {
        let cache = Self::new(config)?;
        spawn_sweeper(&cache, Duration::from_secs(config.sweep_interval.max(1)))?;
        Ok(cache)
    }

    pub fn downgrade(&self) -> WeakShardedCache {
        WeakShardedCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers the shutdown signal of a freshly spawned sweeper.
    ///
    /// Fails if the cache is closed or a sweeper is already attached.
    pub(crate) fn attach_sweeper(&self, shutdown: watch::Sender<bool>) -> Result<()> {
        let mut slot = self.inner.sweeper.lock();
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        if slot.is_some() {
            return Err(CacheError::Usage("sweeper already running".to_string()));
        }
        *slot = Some(shutdown);
        Ok(())
    }

    // == Routing ==
    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// Index of the shard owning `key`.
    #[inline]
    pub fn shard_index(&self, key: &str) -> usize {
        (self.inner.hasher.hash(key) & self.inner.shard_mask) as usize
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        &self.inner.shards[self.shard_index(key)]
    }

    // == Get ==
    /// Retrieves the stored value of a scalar key.
    ///
    /// Expired entries behave as absent. Set keys fail with `TypeMismatch`.
    pub fn get_value(&self, key: &str) -> Result<Value> {
        let entries = self.shard(key).read();
        match live(&entries, key, current_timestamp_ns()) {
            Some(Entry {
                payload: Payload::Scalar(value),
                ..
            }) => {
                self.inner.stats.record_hit();
                Ok(value.clone())
            }
            Some(entry) => Err(CacheError::mismatch(key, "scalar", entry.kind().as_str())),
            None => {
                self.inner.stats.record_miss();
                Err(CacheError::KeyNotFound(key.to_string()))
            }
        }
    }

    /// Retrieves a scalar key as `T`.
    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        T::from_value(self.get_value(key)?, key)
    }

    /// Retrieves an opaque payload stored with [`Value::any`].
    pub fn get_any<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        self.get_value(key)?.downcast(key)
    }

    /// Retrieves a scalar key by deserializing its JSON form into `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_value(key)?.deserialize(key)
    }

    // == Set ==
    /// Stores a scalar value; a zero `ttl` never expires.
    ///
    /// Overwrites any scalar entry. A live set entry is left untouched and
    /// the call fails with `TypeMismatch`.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - Anything convertible into a [`Value`]
    /// * `ttl` - Lifetime of the entry, `Duration::ZERO` for none
    pub fn set(&self, key: &str, value: impl Into<Value>, ttl: Duration) -> Result<()> {
        let mut entries = self.shard(key).write();
        if let Some(entry) = live(&entries, key, current_timestamp_ns()) {
            if let Payload::Set(_) = entry.payload {
                return Err(CacheError::mismatch(key, "scalar", "set"));
            }
        }
        entries.insert(key.to_string(), Entry::scalar(value.into(), ttl));
        Ok(())
    }

    /// Stores a scalar value only if the key is absent or expired.
    ///
    /// Returns whether the value was stored.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - Anything convertible into a [`Value`]
    /// * `ttl` - Lifetime of the entry, `Duration::ZERO` for none
    pub fn set_nx(&self, key: &str, value: impl Into<Value>, ttl: Duration) -> Result<bool> {
        let mut entries = self.shard(key).write();
        if live(&entries, key, current_timestamp_ns()).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::scalar(value.into(), ttl));
        Ok(true)
    }

    // == Delete ==
    /// Removes the given keys, locking each affected shard once.
    ///
    /// Returns the number of live entries removed.
    ///
    /// # Arguments
    /// * `keys` - Keys to remove; absent keys are ignored
    pub fn delete<K: AsRef<str>>(&self, keys: &[K]) -> usize {
        let mut by_shard: HashMap<usize, Vec<&str>> = HashMap::default();
        for key in keys {
            let key = key.as_ref();
            by_shard.entry(self.shard_index(key)).or_default().push(key);
        }

        let now = current_timestamp_ns();
        let mut removed = 0;
        for (index, keys) in by_shard {
            let mut entries = self.inner.shards[index].write();
            for key in keys {
                if let Some(entry) = entries.swap_remove(key) {
                    if !entry.is_expired_at(now) {
                        removed += 1;
                    }
                }
            }
        }
        removed
    }

    /// Removes every key starting with `prefix`, one shard at a time.
    ///
    /// Not atomic across shards. Returns the number of live entries removed.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let now = current_timestamp_ns();
        let mut removed = 0;
        for shard in self.inner.shards.iter() {
            shard.write().retain(|key, entry| {
                if !key.starts_with(prefix) {
                    return true;
                }
                if !entry.is_expired_at(now) {
                    removed += 1;
                }
                false
            });
        }
        removed
    }

    /// Removes every entry.
    pub fn flush(&self) {
        for shard in self.inner.shards.iter() {
            shard.write().clear();
        }
    }

    // == Exists ==
    /// Reports whether a live entry of any kind exists for `key`.
    pub fn exists(&self, key: &str) -> bool {
        let entries = self.shard(key).read();
        live(&entries, key, current_timestamp_ns()).is_some()
    }

    /// Kind of the live entry at `key`, if any.
    pub fn kind(&self, key: &str) -> Option<EntryKind> {
        let entries = self.shard(key).read();
        live(&entries, key, current_timestamp_ns()).map(Entry::kind)
    }

    // == Set Operations ==
    /// Adds members to the set at `key`, creating it when absent.
    ///
    /// Returns the number of members that were not already present. A live
    /// scalar at `key` fails with `TypeMismatch`, even for an empty member
    /// list. An empty list never creates the set.
    ///
    /// # Arguments
    /// * `key` - The set key
    /// * `members` - Members to add; duplicates are counted once
    pub fn sadd<M: AsRef<str>>(&self, key: &str, members: &[M]) -> Result<usize> {
        let now = current_timestamp_ns();
        let mut entries = self.shard(key).write();
        if members.is_empty() {
            return match live(&entries, key, now).map(|entry| &entry.payload) {
                Some(Payload::Scalar(_)) => Err(CacheError::mismatch(key, "set", "scalar")),
                _ => Ok(0),
            };
        }
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::set);
        if entry.is_expired_at(now) {
            *entry = Entry::set();
        }
        match &mut entry.payload {
            Payload::Set(set) => Ok(members
                .iter()
                .map(|member| member.as_ref())
                .filter(|member| set.insert(member.to_string()))
                .count()),
            Payload::Scalar(_) => Err(CacheError::mismatch(key, "set", "scalar")),
        }
    }

    /// Reports set membership; false for absent or scalar keys.
    pub fn sismember(&self, key: &str, member: &str) -> bool {
        let entries = self.shard(key).read();
        match live(&entries, key, current_timestamp_ns()).map(|entry| &entry.payload) {
            Some(Payload::Set(set)) => set.contains(member),
            _ => false,
        }
    }

    /// Returns a snapshot of the members of the set at `key`.
    pub fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let entries = self.shard(key).read();
        match live(&entries, key, current_timestamp_ns()).map(|entry| &entry.payload) {
            Some(Payload::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(Payload::Scalar(_)) => Err(CacheError::mismatch(key, "set", "scalar")),
            None => Ok(Vec::new()),
        }
    }

    /// Number of members of the set at `key`.
    pub fn scard(&self, key: &str) -> Result<usize> {
        let entries = self.shard(key).read();
        match live(&entries, key, current_timestamp_ns()).map(|entry| &entry.payload) {
            Some(Payload::Set(set)) => Ok(set.len()),
            Some(Payload::Scalar(_)) => Err(CacheError::mismatch(key, "set", "scalar")),
            None => Ok(0),
        }
    }

    /// Removes members from the set at `key`; an emptied set is deleted.
    ///
    /// Returns the number of members removed.
    ///
    /// # Arguments
    /// * `key` - The set key
    /// * `members` - Members to remove; absent members are ignored
    pub fn srem<M: AsRef<str>>(&self, key: &str, members: &[M]) -> Result<usize> {
        let mut entries = self.shard(key).write();
        let (removed, emptied) =
            match live_mut(&mut entries, key, current_timestamp_ns()).map(|e| &mut e.payload) {
                Some(Payload::Set(set)) => {
                    let removed = members
                        .iter()
                        .map(|member| member.as_ref())
                        .filter(|member| set.remove(*member))
                        .count();
                    (removed, set.is_empty())
                }
                Some(Payload::Scalar(_)) => return Err(CacheError::mismatch(key, "set", "scalar")),
                None => return Ok(0),
            };
        if emptied {
            entries.swap_remove(key);
        }
        Ok(removed)
    }

    // == Counters ==
    /// Adds `delta` to the counter at `key`, starting from 0 when absent.
    ///
    /// The read-modify-write runs under the shard write lock. Overflow fails
    /// and leaves the counter unchanged.
    ///
    /// # Arguments
    /// * `key` - The counter key; must hold an integer if present
    /// * `delta` - Signed amount to add
    pub fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let now = current_timestamp_ns();
        let mut entries = self.shard(key).write();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::scalar(Value::Int(0), Duration::ZERO));
        if entry.is_expired_at(now) {
            *entry = Entry::scalar(Value::Int(0), Duration::ZERO);
        }
        match &mut entry.payload {
            Payload::Scalar(Value::Int(counter)) => {
                let next = counter.checked_add(delta).ok_or_else(|| {
                    CacheError::Usage(format!("counter {} would overflow", key))
                })?;
                *counter = next;
                Ok(next)
            }
            Payload::Scalar(other) => Err(CacheError::mismatch(key, "int", other.type_name())),
            Payload::Set(_) => Err(CacheError::mismatch(key, "int", "set")),
        }
    }

    pub fn incr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, 1)
    }

    pub fn decr(&self, key: &str) -> Result<i64> {
        self.incr_by(key, -1)
    }

    // == Expiry ==
    /// Sets the deadline of a live key to `now + ttl`, for any entry kind.
    ///
    /// A zero `ttl` expires the key immediately.
    ///
    /// # Arguments
    /// * `key` - A live key of any kind
    /// * `ttl` - New lifetime measured from now
    pub fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.shard(key).write();
        match live_mut(&mut entries, key, current_timestamp_ns()) {
            None => return Err(CacheError::KeyNotFound(key.to_string())),
            Some(entry) if !ttl.is_zero() => {
                entry.expire_at = deadline(ttl);
                return Ok(());
            }
            Some(_) => {}
        }
        entries.swap_remove(key);
        Ok(())
    }

    /// Removes the deadline of a live key.
    pub fn persist(&self, key: &str) -> Result<()> {
        let mut entries = self.shard(key).write();
        let entry = live_mut(&mut entries, key, current_timestamp_ns())
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))?;
        entry.expire_at = 0;
        Ok(())
    }

    /// Remaining lifetime of a live key.
    pub fn ttl(&self, key: &str) -> Result<Ttl> {
        let entries = self.shard(key).read();
        live(&entries, key, current_timestamp_ns())
            .map(Entry::ttl)
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))
    }

    // == Sweep ==
    /// Runs one sweep cycle over every shard.
    ///
    /// Per shard, at most `sweep_scan_budget` entries are visited under the
    /// read lock, starting where the previous cycle stopped, and at most
    /// `sweep_max_evictions` expired keys are collected. Those are
    /// re-checked and removed under the write lock. Large shards are
    /// therefore covered over several cycles. Returns the number of entries
    /// reclaimed.
    pub fn sweep_now(&self) -> usize {
        let limit = self.inner.sweep_max_evictions;
        let budget = self.inner.sweep_scan_budget;
        let mut removed = 0;
        for shard in self.inner.shards.iter() {
            let candidates = shard.collect_expired(current_timestamp_ns(), limit, budget);
            removed += shard.evict_expired(&candidates);
        }
        self.inner.stats.record_sweep(removed);
        removed
    }

    // == Introspection ==
    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.shards.iter().all(Shard::is_empty)
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.len())
    }

    // == Lifecycle ==
    pub fn ping(&self) -> Result<()> {
        if self.is_closed() {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Marks the cache closed and stops the sweeper. Safe to call repeatedly.
    ///
    /// Stored data stays readable through existing handles.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.inner.sweeper.lock();
        self.inner.closed.store(true, Ordering::Release);
        if let Some(shutdown) = slot.take() {
            // The sweeper may already be gone; nothing to signal then.
            let _ = shutdown.send(true);
        }
        Ok(())
    }
}
