//! Integration Tests for the Cache Engine
//!
//! Drives the public API and the `Cache` trait end to end.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use shard_cache::{Cache, CacheError, CacheExt, Config, ShardedCache, Ttl, Value};

// == Helper Functions ==

fn create_test_cache() -> ShardedCache {
    ShardedCache::new(&Config::with_shards(16)).unwrap()
}

// == Scalar Operations ==

#[test]
fn test_round_trip_common_types() {
    let cache = create_test_cache();

    cache.set("s", "text", Duration::ZERO).unwrap();
    cache.set("i", 42i64, Duration::ZERO).unwrap();
    cache.set("f", 1.5f64, Duration::ZERO).unwrap();
    cache.set("b", true, Duration::ZERO).unwrap();
    cache.set("raw", vec![0u8, 1, 2], Duration::ZERO).unwrap();

    assert_eq!(cache.get::<String>("s").unwrap(), "text");
    assert_eq!(cache.get::<i64>("i").unwrap(), 42);
    assert_eq!(cache.get::<f64>("f").unwrap(), 1.5);
    assert!(cache.get::<bool>("b").unwrap());
    assert_eq!(cache.get::<Vec<u8>>("raw").unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_expiry_hides_entry() {
    let cache = create_test_cache();
    cache.set("k", "v", Duration::from_millis(100)).unwrap();

    assert!(cache.get::<String>("k").is_ok());
    sleep(Duration::from_millis(150));

    let err = cache.get::<String>("k").unwrap_err();
    assert_eq!(err, CacheError::KeyNotFound("k".to_string()));
}

#[test]
fn test_never_expire_sentinel() {
    let cache = create_test_cache();
    cache.set("k", "v", Duration::ZERO).unwrap();

    let ttl = cache.ttl("k").unwrap();
    assert_eq!(ttl, Ttl::Persistent);
    assert_eq!(ttl.as_secs(), -1);
}

#[test]
fn test_prefix_delete() {
    let cache = create_test_cache();
    cache.set("user:1", "a", Duration::ZERO).unwrap();
    cache.set("user:2", "b", Duration::ZERO).unwrap();
    cache.set("product:1", "c", Duration::ZERO).unwrap();

    assert_eq!(cache.delete_prefix("user:"), 2);
    assert!(!cache.exists("user:1"));
    assert!(!cache.exists("user:2"));
    assert_eq!(cache.get::<String>("product:1").unwrap(), "c");
}

// == Set Operations ==

#[test]
fn test_sadd_same_member_once() {
    let cache = create_test_cache();
    for _ in 0..5 {
        cache.sadd("tags", &["rust"]).unwrap();
    }
    assert_eq!(cache.smembers("tags").unwrap(), vec!["rust".to_string()]);
}

#[test]
fn test_set_emptying_removes_entry() {
    let cache = create_test_cache();
    cache.sadd("k", &["a"]).unwrap();
    cache.srem("k", &["a"]).unwrap();
    assert!(!cache.exists("k"));
}

#[test]
fn test_kind_conflicts() {
    let cache = create_test_cache();
    cache.set("scalar", "v", Duration::ZERO).unwrap();
    cache.sadd("set", &["m"]).unwrap();

    assert!(matches!(
        cache.sadd("scalar", &["m"]),
        Err(CacheError::TypeMismatch { .. })
    ));
    assert!(matches!(
        cache.set("set", "v", Duration::ZERO),
        Err(CacheError::TypeMismatch { .. })
    ));
    assert!(matches!(
        cache.get::<String>("set"),
        Err(CacheError::TypeMismatch { .. })
    ));
    assert!(!cache.sismember("scalar", "m"));
}

// == Concurrency ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_incr_reaches_exact_total() {
    let cache = create_test_cache();

    let tasks: Vec<_> = (0..1000)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { Cache::incr(&cache, "counter").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(cache.get::<i64>("counter").unwrap(), 1000);
}

#[test]
fn test_concurrent_writers_leave_one_value() {
    let cache = create_test_cache();
    let threads: Vec<_> = (0..32)
        .map(|i| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    cache.set("shared", i as i64, Duration::ZERO).unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let value = cache.get::<i64>("shared").unwrap();
    assert!((0..32).contains(&value));
    assert_eq!(cache.len(), 1);
}

// == Trait and Pipeline ==

#[tokio::test]
async fn test_pipeline_batching_scenario() {
    let cache: Arc<dyn Cache> = Arc::new(create_test_cache());
    cache.set("k1", "v1".into(), Duration::ZERO).await.unwrap();
    cache.sadd("s1", &["m1".to_string()]).await.unwrap();

    let mut pipe = cache.pipeline();
    let exists = pipe.exists("k1");
    let member = pipe.sismember("s1", "m1");
    let expire = pipe.expire("k1", Duration::from_secs(3600));

    assert_eq!(pipe.exec().await.unwrap(), 3);

    assert!(exists.result().unwrap());
    assert!(member.result().unwrap());
    assert_eq!(expire.result(), Ok(()));
    assert!(matches!(cache.ttl("k1").await.unwrap(), Ttl::Expires(_)));
}

#[tokio::test]
async fn test_trait_object_typed_reads() {
    let cache: Arc<dyn Cache> = Arc::new(create_test_cache());
    cache
        .set("session", Value::json(&serde_json::json!({"uid": 9})).unwrap(), Duration::ZERO)
        .await
        .unwrap();

    let doc = cache.get_as::<serde_json::Value>("session").await.unwrap();
    assert_eq!(doc["uid"], 9);
    assert!(cache.get_as::<String>("missing").await.unwrap_err().is_not_found());
}

// == Lifecycle ==

#[tokio::test]
async fn test_open_sweeps_and_close_stops() {
    let config = Config {
        shard_count: 4,
        sweep_interval: 1,
        ..Config::default()
    };
    let cache = ShardedCache::open(&config).unwrap();
    cache.set("short", "v", Duration::from_millis(100)).unwrap();

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(cache.is_empty());
    assert_eq!(cache.stats().expired_reclaimed, 1);

    cache.close().unwrap();
    cache.close().unwrap();
    assert_eq!(cache.ping(), Err(CacheError::Closed));
}

#[test]
fn test_invalid_shard_count() {
    let result = ShardedCache::new(&Config::with_shards(1 << 20));
    assert!(matches!(result, Err(CacheError::Usage(_))));
}
