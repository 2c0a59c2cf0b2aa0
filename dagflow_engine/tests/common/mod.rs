//! Common utilities for workflow integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dagflow_engine::workflow::{FunctionTask, TaskError, TaskId, WorkflowError, WorkflowResult};
use dagflow_runtime::{TokioPool, WorkerPool};
use serde_json::{json, Value};

/// Unbounded pool for tests that do not care about limits.
pub fn pool() -> Arc<dyn WorkerPool> {
    Arc::new(TokioPool::unbounded())
}

/// Task that sleeps for `ms` milliseconds, then returns its own id.
pub fn sleeping_task(id: &str, ms: u64) -> FunctionTask {
    let name = id.to_string();
    FunctionTask::new(id, move |_, _| {
        let name = name.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!(name))
        }
    })
}

/// Task that waits until its token is cancelled, or gives up after 10s.
pub fn cancellable_task(id: &str) -> FunctionTask {
    FunctionTask::new(id, |token, _| async move {
        tokio::select! {
            _ = token.cancelled() => Err(TaskError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs(10)) => Ok(Value::Null),
        }
    })
}

/// Tracks how many tasks run at the same time.
#[derive(Clone, Default)]
pub struct ConcurrencyGauge {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    /// Task that holds a slot of the gauge for `ms` milliseconds.
    pub fn task(&self, id: &str, ms: u64) -> FunctionTask {
        let gauge = self.clone();
        FunctionTask::new(id, move |_, _| {
            let gauge = gauge.clone();
            async move {
                let now = gauge.running.fetch_add(1, Ordering::SeqCst) + 1;
                gauge.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                gauge.running.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub fn ids(ids: &[&str]) -> Vec<TaskId> {
    ids.iter().map(|id| TaskId::new(*id)).collect()
}

/// Splits the outcome of an execution expected to stop early into its cause
/// and the results gathered before it stopped.
pub fn stopped(outcome: Result<WorkflowResult, WorkflowError>) -> (WorkflowError, WorkflowResult) {
    match outcome {
        Ok(result) => panic!("execution succeeded with {} results", result.task_results.len()),
        Err(WorkflowError::Failed { source, result }) => (*source, *result),
        Err(other) => panic!("execution did not start: {other}"),
    }
}
