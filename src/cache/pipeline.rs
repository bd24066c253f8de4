//! Pipeline Module
//!
//! Batches cache commands and runs them in a single `exec` call. A batch is
//! not a transaction: every command runs on its own and reports its own
//! outcome through a result handle.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::cache::{Cache, Ttl, Value};
use crate::error::{CacheError, Result};

type Slot<T> = Arc<OnceLock<Result<T>>>;

// == Result Handle ==
/// Deferred outcome of one queued command, filled in by [`Pipeline::exec`].
pub struct CmdResult<T> {
    slot: Slot<T>,
}

impl<T: Clone> CmdResult<T> {
    /// Returns the command's outcome.
    ///
    /// Fails with `Usage` if the pipeline has not been executed yet.
    pub fn result(&self) -> Result<T> {
        match self.slot.get() {
            Some(outcome) => outcome.clone(),
            None => Err(CacheError::Usage(
                "pipeline result read before exec".to_string(),
            )),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<T> fmt::Debug for CmdResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmdResult")
            .field("ready", &self.slot.get().is_some())
            .finish()
    }
}

enum Command {
    Get { key: String, out: Slot<Value> },
    Set { key: String, value: Value, ttl: Duration, out: Slot<()> },
    Del { keys: Vec<String>, out: Slot<usize> },
    Exists { key: String, out: Slot<bool> },
    SAdd { key: String, members: Vec<String>, out: Slot<usize> },
    SRem { key: String, members: Vec<String>, out: Slot<usize> },
    SIsMember { key: String, member: String, out: Slot<bool> },
    SMembers { key: String, out: Slot<Vec<String>> },
    Incr { key: String, out: Slot<i64> },
    Decr { key: String, out: Slot<i64> },
    Expire { key: String, ttl: Duration, out: Slot<()> },
    Ttl { key: String, out: Slot<Ttl> },
}

fn fill<T>(slot: &Slot<T>, outcome: Result<T>) {
    // Each slot is filled exactly once, by the exec that drained its command.
    let _ = slot.set(outcome);
}

impl Command {
    async fn run(self, cache: &dyn Cache) {
        match self {
            Command::Get { key, out } => fill(&out, cache.get(&key).await),
            Command::Set { key, value, ttl, out } => fill(&out, cache.set(&key, value, ttl).await),
            Command::Del { keys, out } => fill(&out, cache.delete(&keys).await),
            Command::Exists { key, out } => fill(&out, cache.exists(&key).await),
            Command::SAdd { key, members, out } => fill(&out, cache.sadd(&key, &members).await),
            Command::SRem { key, members, out } => fill(&out, cache.srem(&key, &members).await),
            Command::SIsMember { key, member, out } => {
                fill(&out, cache.sismember(&key, &member).await)
            }
            Command::SMembers { key, out } => fill(&out, cache.smembers(&key).await),
            Command::Incr { key, out } => fill(&out, cache.incr(&key).await),
            Command::Decr { key, out } => fill(&out, cache.decr(&key).await),
            Command::Expire { key, ttl, out } => fill(&out, cache.expire(&key, ttl).await),
            Command::Ttl { key, out } => fill(&out, cache.ttl(&key).await),
        }
    }

    fn fail(self, err: CacheError) {
        match self {
            Command::Get { out, .. } => fill(&out, Err(err)),
            Command::Set { out, .. } | Command::Expire { out, .. } => fill(&out, Err(err)),
            Command::Del { out, .. } | Command::SAdd { out, .. } | Command::SRem { out, .. } => {
                fill(&out, Err(err))
            }
            Command::Exists { out, .. } | Command::SIsMember { out, .. } => fill(&out, Err(err)),
            Command::SMembers { out, .. } => fill(&out, Err(err)),
            Command::Incr { out, .. } | Command::Decr { out, .. } => fill(&out, Err(err)),
            Command::Ttl { out, .. } => fill(&out, Err(err)),
        }
    }
}

// == Pipeline ==
/// A batch of commands bound to one cache.
pub struct Pipeline {
    cache: Arc<dyn Cache>,
    commands: Vec<Command>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("queued", &self.commands.len())
            .finish()
    }
}

impl Pipeline {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            commands: Vec::new(),
        }
    }

    fn queue<T>(&mut self, make: impl FnOnce(Slot<T>) -> Command) -> CmdResult<T> {
        let slot: Slot<T> = Arc::new(OnceLock::new());
        self.commands.push(make(Arc::clone(&slot)));
        CmdResult { slot }
    }

    pub fn get(&mut self, key: &str) -> CmdResult<Value> {
        let key = key.to_string();
        self.queue(|out| Command::Get { key, out })
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>, ttl: Duration) -> CmdResult<()> {
        let (key, value) = (key.to_string(), value.into());
        self.queue(|out| Command::Set { key, value, ttl, out })
    }

    pub fn del<K: AsRef<str>>(&mut self, keys: &[K]) -> CmdResult<usize> {
        let keys = keys.iter().map(|k| k.as_ref().to_string()).collect();
        self.queue(|out| Command::Del { keys, out })
    }

    pub fn exists(&mut self, key: &str) -> CmdResult<bool> {
        let key = key.to_string();
        self.queue(|out| Command::Exists { key, out })
    }

    pub fn sadd<M: AsRef<str>>(&mut self, key: &str, members: &[M]) -> CmdResult<usize> {
        let (key, members) = (key.to_string(), owned(members));
        self.queue(|out| Command::SAdd { key, members, out })
    }

    pub fn srem<M: AsRef<str>>(&mut self, key: &str, members: &[M]) -> CmdResult<usize> {
        let (key, members) = (key.to_string(), owned(members));
        self.queue(|out| Command::SRem { key, members, out })
    }

    pub fn sismember(&mut self, key: &str, member: &str) -> CmdResult<bool> {
        let (key, member) = (key.to_string(), member.to_string());
        self.queue(|out| Command::SIsMember { key, member, out })
    }

    pub fn smembers(&mut self, key: &str) -> CmdResult<Vec<String>> {
        let key = key.to_string();
        self.queue(|out| Command::SMembers { key, out })
    }

    pub fn incr(&mut self, key: &str) -> CmdResult<i64> {
        let key = key.to_string();
        self.queue(|out| Command::Incr { key, out })
    }

    pub fn decr(&mut self, key: &str) -> CmdResult<i64> {
        let key = key.to_string();
        self.queue(|out| Command::Decr { key, out })
    }

    pub fn expire(&mut self, key: &str, ttl: Duration) -> CmdResult<()> {
        let key = key.to_string();
        self.queue(|out| Command::Expire { key, ttl, out })
    }

    pub fn ttl(&mut self, key: &str) -> CmdResult<Ttl> {
        let key = key.to_string();
        self.queue(|out| Command::Ttl { key, out })
    }

    /// Number of commands waiting for `exec`.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drops every queued command. Their handles never become ready.
    pub fn discard(&mut self) {
        self.commands.clear();
    }

    // == Exec ==
    /// Runs every queued command in order and fills in its handle.
    ///
    /// Individual command failures only surface through their handles.
    /// The call itself fails only if the cache is unusable (e.g. closed), in
    /// which case every handle carries that error. Returns the number of
    /// commands run; the pipeline is empty and reusable afterwards.
    pub async fn exec(&mut self) -> Result<usize> {
        let commands = std::mem::take(&mut self.commands);

        if let Err(err) = self.cache.ping().await {
            for command in commands {
                command.fail(err.clone());
            }
            return Err(err);
        }

        let count = commands.len();
        for command in commands {
            command.run(self.cache.as_ref()).await;
        }
        Ok(count)
    }
}

fn owned<M: AsRef<str>>(members: &[M]) -> Vec<String> {
    members.iter().map(|m| m.as_ref().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ShardedCache;
    use crate::config::Config;

    fn test_cache() -> ShardedCache {
        ShardedCache::new(&Config::with_shards(4)).unwrap()
    }

    #[tokio::test]
    async fn test_pipeline_batch() {
        let cache = test_cache();
        cache.set("k1", "v1", Duration::ZERO).unwrap();
        cache.sadd("s1", &["m1"]).unwrap();

        let mut pipe = cache.pipeline();
        let exists = pipe.exists("k1");
        let member = pipe.sismember("s1", "m1");
        let expire = pipe.expire("k1", Duration::from_secs(3600));
        assert_eq!(pipe.len(), 3);

        assert_eq!(pipe.exec().await.unwrap(), 3);
        assert!(pipe.is_empty());

        assert!(exists.result().unwrap());
        assert!(member.result().unwrap());
        assert!(expire.result().is_ok());
        assert!(matches!(cache.ttl("k1").unwrap(), Ttl::Expires(_)));
    }

    #[tokio::test]
    async fn test_result_before_exec_is_usage_error() {
        let cache = test_cache();
        let mut pipe = cache.pipeline();
        let handle = pipe.incr("n");

        assert!(!handle.is_ready());
        assert!(matches!(handle.result(), Err(CacheError::Usage(_))));

        pipe.exec().await.unwrap();
        assert!(handle.is_ready());
        assert_eq!(handle.result().unwrap(), 1);
        assert_eq!(handle.result().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let cache = test_cache();
        cache.set("text", "abc", Duration::ZERO).unwrap();

        let mut pipe = cache.pipeline();
        let bad_incr = pipe.incr("text");
        let missing = pipe.expire("missing", Duration::from_secs(1));
        let set = pipe.set("after", 10i64, Duration::ZERO);
        let get = pipe.get("after");

        assert_eq!(pipe.exec().await.unwrap(), 4);

        assert!(matches!(
            bad_incr.result(),
            Err(CacheError::TypeMismatch { .. })
        ));
        assert!(matches!(missing.result(), Err(CacheError::KeyNotFound(_))));
        assert!(set.result().is_ok());
        assert_eq!(get.result().unwrap(), Value::Int(10));
    }

    #[tokio::test]
    async fn test_exec_on_closed_cache_fails_every_handle() {
        let cache = test_cache();
        let mut pipe = cache.pipeline();
        let exists = pipe.exists("k");
        let members = pipe.smembers("s");

        cache.close().unwrap();

        assert_eq!(pipe.exec().await, Err(CacheError::Closed));
        assert_eq!(exists.result(), Err(CacheError::Closed));
        assert_eq!(members.result(), Err(CacheError::Closed));
    }

    #[tokio::test]
    async fn test_discard_leaves_handles_pending() {
        let cache = test_cache();
        let mut pipe = cache.pipeline();
        let handle = pipe.set("k", "v", Duration::ZERO);
        pipe.discard();

        assert_eq!(pipe.exec().await.unwrap(), 0);
        assert!(!handle.is_ready());
        assert!(!cache.exists("k"));
    }
}
