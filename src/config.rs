//! Configuration Module
//!
//! Handles loading the sweep runtime and demo settings from environment variables.

use std::env;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Async worker threads driving the sweep timers
    pub sweep_worker_threads: usize,
    /// Maximum number of threads that may run sweeps concurrently
    pub sweep_blocking_threads: usize,
    /// TTL in milliseconds used by the demo binary
    pub default_ttl_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SWEEP_WORKER_THREADS` - Timer worker threads (default: 1)
    /// - `SWEEP_BLOCKING_THREADS` - Sweep threads (default: 4)
    /// - `DEFAULT_TTL_MS` - Demo TTL in milliseconds (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_worker_threads: env::var("SWEEP_WORKER_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.sweep_worker_threads),
            sweep_blocking_threads: env::var("SWEEP_BLOCKING_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.sweep_blocking_threads),
            default_ttl_ms: env::var("DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_ttl_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_worker_threads: 1,
            sweep_blocking_threads: 4,
            default_ttl_ms: 5000,
        }
    }
}
