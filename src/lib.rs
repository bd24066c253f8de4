//! Shard Cache - A sharded in-process key-value cache
//!
//! Provides Redis-like functionality (TTL, sets, counters, pipelines) behind
//! a uniform async cache trait, with a background expiry sweeper.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheExt, Pipeline, ShardedCache, Ttl, Value};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweeper;
