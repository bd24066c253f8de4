//! Expiry Sweeper Task
//!
//! Background task that periodically reclaims expired cache entries.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::ShardedCache;
use crate::error::{CacheError, Result};

/// Spawns the background sweeper for `cache` on the current tokio runtime.
///
/// Every `period` the task runs one [`ShardedCache::sweep_now`] cycle. It
/// stops when the cache is closed or when every cache handle is dropped,
/// since it only keeps a weak reference.
///
/// # Errors
/// - `Usage` if called outside a tokio runtime or a sweeper is already attached
/// - `Closed` if the cache was closed
///
/// # Example
/// ```ignore
/// let cache = ShardedCache::new(&Config::default())?;
/// let handle = spawn_sweeper(&cache, Duration::from_secs(60))?;
/// // Later, during shutdown:
/// cache.close()?;
/// handle.await?;
/// ```
pub fn spawn_sweeper(cache: &ShardedCache, period: Duration) -> Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| CacheError::Usage("sweeper requires a tokio runtime".to_string()))?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    cache.attach_sweeper(shutdown_tx)?;
    let weak = cache.downgrade();

    Ok(runtime.spawn(async move {
        info!("Starting expiry sweeper with interval of {:?}", period);

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown_rx.changed() => {
                    // Err means the sender is gone, which only happens on close.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let Some(cache) = weak.upgrade() else {
                break;
            };

            let removed = cache.sweep_now();
            if removed > 0 {
                info!("Expiry sweep: reclaimed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }

        info!("Expiry sweeper stopped");
    }))
}
