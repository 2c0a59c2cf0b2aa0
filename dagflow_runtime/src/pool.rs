//! Worker pool for running task jobs.
//!
//! [`WorkerPool`] is the seam the orchestrator dispatches through. The
//! provided [`TokioPool`] spawns each job on the tokio runtime and bounds the
//! number of concurrently running jobs with a semaphore.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::cancellation::CancellationToken;
use crate::metrics::{PoolEvent, PoolMetrics};
use crate::RuntimeConfig;

/// A unit of work submitted to a pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Payload of a caught panic.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Callback invoked with the job's token when the job panics.
pub type PanicHandler = Box<dyn FnOnce(&CancellationToken, PanicPayload) + Send + 'static>;

/// Executes jobs asynchronously.
///
/// `run` must return without waiting for the job. If the job panics the pool
/// catches the panic and calls `on_panic` exactly once; otherwise `on_panic`
/// is dropped unused.
pub trait WorkerPool: Send + Sync {
    fn run(&self, token: CancellationToken, job: Job, on_panic: PanicHandler);
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &PanicPayload) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Tokio-backed worker pool.
///
/// At most `max_workers` jobs run at once (`0` lifts the limit). Jobs beyond
/// that wait for a permit inside their own spawned task. Once
/// `queue_capacity` jobs are waiting, further jobs run immediately without a
/// permit and are counted as overflow.
///
/// Must be used from within a tokio runtime.
///
/// # Examples
///
/// ```
/// use dagflow_runtime::{CancellationToken, RuntimeConfig, TokioPool, WorkerPool};
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = TokioPool::new(&RuntimeConfig::default());
/// let (tx, rx) = tokio::sync::oneshot::channel();
///
/// pool.run(
///     CancellationToken::default(),
///     Box::pin(async move {
///         let _ = tx.send(42);
///     }),
///     Box::new(|_: &CancellationToken, _| {}),
/// );
///
/// assert_eq!(rx.await.unwrap(), 42);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TokioPool {
    /// Permits for running jobs; `None` when unbounded
    semaphore: Option<Arc<Semaphore>>,
    /// Maximum number of concurrently running jobs
    pub max_workers: usize,
    /// Maximum number of jobs waiting for a permit
    pub queue_capacity: usize,
    metrics: PoolMetrics,
}

impl TokioPool {
    /// Creates a pool from runtime configuration.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_limits(config.max_workers, config.queue_capacity)
    }

    /// Creates a pool with explicit limits.
    pub fn with_limits(max_workers: usize, queue_capacity: usize) -> Self {
        let semaphore = (max_workers > 0).then(|| Arc::new(Semaphore::new(max_workers)));
        Self {
            semaphore,
            max_workers,
            queue_capacity,
            metrics: PoolMetrics::new(),
        }
    }

    /// Creates a pool without a concurrency limit.
    pub fn unbounded() -> Self {
        Self::with_limits(0, 0)
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Free permits, or `None` for an unbounded pool.
    pub fn available_workers(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Decides whether a new job should wait for a permit.
    fn gate(&self) -> Option<Arc<Semaphore>> {
        let semaphore = self.semaphore.as_ref()?;
        let saturated = semaphore.available_permits() == 0
            && self.metrics.queued() >= self.queue_capacity as u64;
        if saturated {
            tracing::warn!(
                max_workers = self.max_workers,
                queue_capacity = self.queue_capacity,
                "worker pool saturated, running job without a permit"
            );
            self.metrics.record(PoolEvent::Overflowed);
            return None;
        }
        Some(semaphore.clone())
    }
}

impl Default for TokioPool {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

impl WorkerPool for TokioPool {
    fn run(&self, token: CancellationToken, job: Job, on_panic: PanicHandler) {
        self.metrics.record(PoolEvent::Submitted);
        let gate = self.gate();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let _permit = match gate {
                Some(semaphore) => {
                    metrics.enqueue();
                    // The semaphore is never closed
                    let permit = semaphore.acquire_owned().await.ok();
                    metrics.dequeue();
                    permit
                }
                None => None,
            };

            let started = Instant::now();
            match tokio::spawn(job).await {
                Ok(()) => metrics.record_timing(PoolEvent::Completed, started.elapsed()),
                Err(err) if err.is_panic() => {
                    metrics.record_timing(PoolEvent::Panicked, started.elapsed());
                    let payload = err.into_panic();
                    tracing::error!(message = %panic_message(&payload), "job panicked");
                    on_panic(&token, payload);
                }
                Err(err) => {
                    metrics.record(PoolEvent::Aborted);
                    tracing::warn!(error = %err, "job aborted before completion");
                }
            }
        });
    }
}
