//! Cache Module
//!
//! Sharded in-process caching with TTL expiration, set collections,
//! counters and pipelined batches.

mod backend;
mod entry;
mod hasher;
mod pipeline;
mod shard;
mod stats;
mod store;
mod value;


// Re-export public types
pub use backend::{Cache, CacheExt};
pub use entry::{EntryKind, Ttl};
pub use hasher::KeyHasher;
pub use pipeline::{CmdResult, Pipeline};
pub use stats::{CacheStats, StatsCounters};
pub use store::{ShardedCache, WeakShardedCache};
pub use value::{FromValue, Value};
