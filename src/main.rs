//! Shard Cache - A sharded in-process key-value cache
//!
//! Hosts a cache instance with its expiry sweeper and reports statistics
//! until shutdown.

use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shard_cache::{Config, ShardedCache};

/// Main entry point for the cache host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and start its expiry sweeper
/// 4. Log cache statistics at the configured interval
/// 5. Close the cache on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shard_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shard Cache");

    let config = Config::from_env();
    let cache = ShardedCache::open(&config).context("failed to open cache")?;
    info!(
        "Cache opened: shards={}, sweep_interval={}s, sweep_max_evictions={}, sweep_scan_budget={}",
        cache.shard_count(),
        config.sweep_interval,
        config.sweep_max_evictions,
        config.sweep_scan_budget
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.stats_interval.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = serde_json::to_string(&cache.stats())
                    .context("failed to encode stats")?;
                info!("Cache stats: {}", stats);
            }
            result = &mut shutdown => {
                result?;
                break;
            }
        }
    }

    cache.close().context("failed to close cache")?;
    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .context("failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
            result
        }
        result = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
            result
        }
    }
}
