//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;

use crate::error::{CacheError, Result};

/// Upper bound on the number of shards a cache may be built with.
pub const MAX_SHARDS: usize = 1 << 16;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Requested shard count; values <= 0 select a default based on CPU count
    pub shard_count: i64,
    /// Background sweep interval in seconds
    pub sweep_interval: u64,
    /// Maximum expired entries reclaimed per shard per sweep cycle
    pub sweep_max_evictions: usize,
    /// Maximum entries visited per shard per sweep cycle
    pub sweep_scan_budget: usize,
    /// Interval in seconds between stats log lines (binary only)
    pub stats_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SHARD_COUNT` - Requested shard count (default: 0, auto)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `SWEEP_MAX_EVICTIONS` - Per-shard eviction bound (default: 1000)
    /// - `SWEEP_SCAN_BUDGET` - Per-shard scan bound (default: 4096)
    /// - `STATS_INTERVAL` - Stats logging frequency in seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            shard_count: parse_var("SHARD_COUNT").unwrap_or(defaults.shard_count),
            sweep_interval: parse_var("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            sweep_max_evictions: parse_var("SWEEP_MAX_EVICTIONS")
                .unwrap_or(defaults.sweep_max_evictions),
            sweep_scan_budget: parse_var("SWEEP_SCAN_BUDGET")
                .unwrap_or(defaults.sweep_scan_budget),
            stats_interval: parse_var("STATS_INTERVAL").unwrap_or(defaults.stats_interval),
        }
    }

    /// Config with an explicit shard count and defaults for everything else.
    pub fn with_shards(shard_count: i64) -> Self {
        Self {
            shard_count,
            ..Self::default()
        }
    }

    /// Normalizes `shard_count` to a power of two.
    ///
    /// Non-positive requests pick `num_cpus * 4` rounded up.
    pub fn resolved_shard_count(&self) -> Result<usize> {
        let requested = if self.shard_count <= 0 {
            num_cpus::get().max(1) * 4
        } else {
            usize::try_from(self.shard_count)
                .map_err(|_| CacheError::Usage(format!("invalid shard count {}", self.shard_count)))?
        };

        match requested.checked_next_power_of_two() {
            Some(count) if count <= MAX_SHARDS => Ok(count),
            _ => Err(CacheError::Usage(format!(
                "shard count {} exceeds maximum of {}",
                requested, MAX_SHARDS
            ))),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_count: 0,
            sweep_interval: 60,
            sweep_max_evictions: 1000,
            sweep_scan_budget: 4096,
            stats_interval: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.shard_count, 0);
        assert_eq!(config.sweep_interval, 60);
        assert_eq!(config.sweep_max_evictions, 1000);
        assert_eq!(config.sweep_scan_budget, 4096);
        assert_eq!(config.stats_interval, 30);
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("SHARD_COUNT");
        env::remove_var("SWEEP_INTERVAL");
        env::remove_var("SWEEP_MAX_EVICTIONS");
        env::remove_var("SWEEP_SCAN_BUDGET");
        env::remove_var("STATS_INTERVAL");

        let config = Config::from_env();
        assert_eq!(config.shard_count, 0);
        assert_eq!(config.sweep_interval, 60);
        assert_eq!(config.sweep_max_evictions, 1000);
        assert_eq!(config.sweep_scan_budget, 4096);
    }

    #[test]
    fn test_shard_count_rounds_up() {
        assert_eq!(Config::with_shards(1).resolved_shard_count().unwrap(), 1);
        assert_eq!(Config::with_shards(5).resolved_shard_count().unwrap(), 8);
        assert_eq!(Config::with_shards(16).resolved_shard_count().unwrap(), 16);
    }

    #[test]
    fn test_shard_count_default_is_power_of_two() {
        let count = Config::with_shards(-3).resolved_shard_count().unwrap();
        assert!(count.is_power_of_two());
        assert!(count >= 4);
    }

    #[test]
    fn test_shard_count_too_large() {
        let result = Config::with_shards(MAX_SHARDS as i64 + 1).resolved_shard_count();
        assert!(matches!(result, Err(CacheError::Usage(_))));
    }
}
