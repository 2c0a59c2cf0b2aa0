//! Dagflow runtime layer - Worker pool and cancellation.
//!
//! This crate provides the execution services the workflow engine runs on:
//!
//! - Cooperative cancellation tokens with parent-child propagation
//! - A tokio-backed worker pool with panic containment
//! - Pool metrics
//!
//! # Examples
//!
//! ```rust
//! use dagflow_runtime::{CancellationTokenSource, RuntimeConfig, TokioPool};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = RuntimeConfig::from_env()?;
//! let pool = TokioPool::new(&config);
//! let source = CancellationTokenSource::new();
//!
//! assert!(!source.token().is_cancelled());
//! assert_eq!(pool.max_workers, config.max_workers);
//! # Ok(())
//! # }
//! ```

pub mod cancellation;
pub mod metrics;
pub mod pool;

pub use cancellation::{CancellationToken, CancellationTokenSource};
pub use metrics::{PoolEvent, PoolMetrics, PoolStats};
pub use pool::{panic_message, Job, PanicHandler, PanicPayload, TokioPool, WorkerPool};

use anyhow::Context;

/// Environment variable overriding [`RuntimeConfig::max_workers`].
pub const MAX_WORKERS_ENV: &str = "DAGFLOW_MAX_WORKERS";
/// Environment variable overriding [`RuntimeConfig::queue_capacity`].
pub const QUEUE_CAPACITY_ENV: &str = "DAGFLOW_QUEUE_CAPACITY";

/// Runtime configuration for the worker pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of concurrently running jobs (0 = unbounded)
    pub max_workers: usize,
    /// Maximum number of jobs waiting for a free worker
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: 64,
            queue_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Builds a configuration from the defaults overridden by
    /// `DAGFLOW_MAX_WORKERS` and `DAGFLOW_QUEUE_CAPACITY`.
    ///
    /// Unset or empty variables keep their default.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(value) = read_usize(&lookup, MAX_WORKERS_ENV)? {
            config.max_workers = value;
        }
        if let Some(value) = read_usize(&lookup, QUEUE_CAPACITY_ENV)? {
            config.queue_capacity = value;
        }
        tracing::debug!(?config, "runtime configuration loaded");
        Ok(config)
    }
}

fn read_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<usize>> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}"))?;
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_runtime_config_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_workers, 64);
        assert_eq!(config.queue_capacity, 1024);
    }

    #[test]
    fn test_config_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (MAX_WORKERS_ENV, "8"),
            (QUEUE_CAPACITY_ENV, " 16 "),
        ]))
        .unwrap();

        assert_eq!(config.max_workers, 8);
        assert_eq!(config.queue_capacity, 16);
    }

    #[test]
    fn test_empty_value_keeps_default() {
        let config = RuntimeConfig::from_lookup(lookup(&[(MAX_WORKERS_ENV, "")])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_invalid_value_is_error() {
        let err = RuntimeConfig::from_lookup(lookup(&[(MAX_WORKERS_ENV, "many")])).unwrap_err();
        assert!(err.to_string().contains(MAX_WORKERS_ENV));
    }
}
