//! Cache Backend Trait
//!
//! The uniform cache surface shared by the in-process engine and by
//! network- or disk-backed adapters.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::cache::{FromValue, Pipeline, ShardedCache, Ttl, Value};
use crate::error::Result;

// == Cache Trait ==
/// Uniform cache interface.
///
/// Adapters that talk to an external engine do real I/O here; the
/// in-process [`ShardedCache`] completes every call without awaiting.
/// Cancellation is expressed by dropping the returned future.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetches a scalar value; a miss is `KeyNotFound`.
    async fn get(&self, key: &str) -> Result<Value>;

    /// Stores a scalar value; a zero `ttl` never expires.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Removes keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    /// Removes every key with the given prefix.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn sadd(&self, key: &str, members: &[String]) -> Result<usize>;

    async fn srem(&self, key: &str, members: &[String]) -> Result<usize>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    async fn incr(&self, key: &str) -> Result<i64>;

    async fn decr(&self, key: &str) -> Result<i64>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    async fn ttl(&self, key: &str) -> Result<Ttl>;

    /// Starts a command batch bound to this cache.
    fn pipeline(&self) -> Pipeline;

    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

// == Typed Reads ==
/// Typed convenience reads available on every [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Fetches `key` and extracts it as `T`.
    async fn get_as<T: FromValue + Send>(&self, key: &str) -> Result<T> {
        let value = self.get(key).await?;
        T::from_value(value, key)
    }

    /// Fetches `key` and deserializes its JSON form into `T`.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T> {
        self.get(key).await?.deserialize(key)
    }

    /// Fetches an opaque payload stored with [`Value::any`].
    async fn get_any<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        self.get(key).await?.downcast(key)
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

// == In-process Engine ==
#[async_trait]
impl Cache for ShardedCache {
    async fn get(&self, key: &str) -> Result<Value> {
        self.get_value(key)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        ShardedCache::set(self, key, value, ttl)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        Ok(ShardedCache::delete(self, keys))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        Ok(ShardedCache::delete_prefix(self, prefix))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(ShardedCache::exists(self, key))
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<usize> {
        ShardedCache::sadd(self, key, members)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<usize> {
        ShardedCache::srem(self, key, members)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(ShardedCache::sismember(self, key, member))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        ShardedCache::smembers(self, key)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        ShardedCache::incr(self, key)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        ShardedCache::decr(self, key)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        ShardedCache::expire(self, key, ttl)
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        ShardedCache::ttl(self, key)
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(Arc::new(self.clone()))
    }

    async fn ping(&self) -> Result<()> {
        ShardedCache::ping(self)
    }

    async fn close(&self) -> Result<()> {
        ShardedCache::close(self)
    }
}
