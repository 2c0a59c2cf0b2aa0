//! Worker pool metrics: job counts, queue depth and busy time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

/// Kind of pool event being counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEvent {
    /// Job handed to the pool
    Submitted,
    /// Job ran without a permit because the wait queue was full
    Overflowed,
    /// Job ran to completion
    Completed,
    /// Job panicked
    Panicked,
    /// Job was aborted by the runtime before completing
    Aborted,
}

const EVENT_KINDS: usize = 5;

/// Pool metrics collector.
///
/// Cloning yields another handle to the same counters.
#[derive(Clone, Debug)]
pub struct PoolMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Event counts by kind
    counts: [AtomicU64; EVENT_KINDS],
    /// Jobs currently waiting for a permit
    queued: AtomicU64,
    /// Total job run time (nanoseconds)
    busy_time_ns: AtomicU64,
}

impl PoolMetrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Records an event occurrence.
    pub fn record(&self, event: PoolEvent) {
        self.inner.counts[event as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finished job together with how long it ran.
    pub fn record_timing(&self, event: PoolEvent, duration: Duration) {
        self.record(event);
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        // Saturates instead of wrapping around
        let _ = self
            .inner
            .busy_time_ns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
                Some(total.saturating_add(nanos))
            });
    }

    pub(crate) fn enqueue(&self) {
        self.inner.queued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn dequeue(&self) {
        self.inner.queued.fetch_sub(1, Ordering::SeqCst);
    }

    /// Gets the count for a specific event.
    pub fn count(&self, event: PoolEvent) -> u64 {
        self.inner.counts[event as usize].load(Ordering::Relaxed)
    }

    /// Jobs currently waiting for a permit.
    pub fn queued(&self) -> u64 {
        self.inner.queued.load(Ordering::SeqCst)
    }

    /// Total time spent running jobs.
    pub fn busy_time(&self) -> Duration {
        Duration::from_nanos(self.inner.busy_time_ns.load(Ordering::Relaxed))
    }

    /// Snapshot of all metrics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.count(PoolEvent::Submitted),
            overflowed: self.count(PoolEvent::Overflowed),
            completed: self.count(PoolEvent::Completed),
            panicked: self.count(PoolEvent::Panicked),
            aborted: self.count(PoolEvent::Aborted),
            queued: self.queued(),
            busy_time: self.busy_time(),
        }
    }

    /// Resets all counters to zero. The queue gauge is left alone.
    pub fn reset(&self) {
        for count in &self.inner.counts {
            count.store(0, Ordering::Relaxed);
        }
        self.inner.busy_time_ns.store(0, Ordering::Relaxed);
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`PoolMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub submitted: u64,
    pub overflowed: u64,
    pub completed: u64,
    pub panicked: u64,
    pub aborted: u64,
    /// Jobs waiting for a permit when the snapshot was taken
    pub queued: u64,
    pub busy_time: Duration,
}

impl PoolStats {
    /// Jobs that have finished in any way.
    pub fn finished(&self) -> u64 {
        self.completed + self.panicked + self.aborted
    }
}
