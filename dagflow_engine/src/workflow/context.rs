//! Run context shared by every task of a workflow.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dagflow_core::{SharedStore, Store};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::workflow::dag::WorkflowError;
use crate::workflow::executor::dispatch;
use crate::workflow::observer::Observer;
use crate::workflow::state::SchedulerState;
use crate::workflow::task::{TaskId, TaskOutput, WorkflowTask};

/// Handle passed to every task execution.
///
/// Exposes the workflow input, outputs of tasks that already succeeded, a
/// shared scratchpad, and the one sanctioned way of adding tasks to a
/// running workflow. Cloning yields another handle to the same workflow.
#[derive(Clone)]
pub struct RunContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    workflow_id: String,
    input: Store,
    /// Written once per task, by the run loop only
    outputs: RwLock<HashMap<TaskId, TaskOutput>>,
    shared: SharedStore,
    state: Mutex<SchedulerState>,
    observer: Arc<dyn Observer>,
}

impl RunContext {
    pub(crate) fn new(
        workflow_id: String,
        input: Store,
        observer: Arc<dyn Observer>,
        state: SchedulerState,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                workflow_id,
                input,
                outputs: RwLock::new(HashMap::new()),
                shared: SharedStore::new(),
                state: Mutex::new(state),
                observer,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(workflow_id: &str) -> Self {
        Self::new(
            workflow_id.to_string(),
            Store::new(),
            Arc::new(crate::workflow::observer::NoopObserver),
            SchedulerState::default(),
        )
    }

    pub fn workflow_id(&self) -> &str {
        &self.inner.workflow_id
    }

    /// Read-only input the workflow was built with.
    pub fn workflow_input(&self) -> &Store {
        &self.inner.input
    }

    /// Output of a task that has succeeded in the current execution.
    pub async fn task_output(&self, id: impl Into<TaskId>) -> Option<TaskOutput> {
        self.inner.outputs.read().await.get(&id.into()).cloned()
    }

    /// Scratchpad tasks may read and write freely.
    pub fn shared_data(&self) -> &SharedStore {
        &self.inner.shared
    }

    /// Registers one task. See [`add_tasks`](Self::add_tasks).
    pub async fn add_task(&self, task: impl WorkflowTask + 'static) -> Result<(), WorkflowError> {
        self.add_tasks(vec![Arc::new(task) as Arc<dyn WorkflowTask>])
            .await
    }

    /// Registers a batch of tasks, all or nothing.
    ///
    /// Safe to call from running tasks. During an execution, tasks whose
    /// dependencies have already succeeded start immediately; the others
    /// start once their dependencies succeed. Every dependency must then be
    /// registered or part of the same batch.
    pub async fn add_tasks(&self, tasks: Vec<Arc<dyn WorkflowTask>>) -> Result<(), WorkflowError> {
        let count = tasks.len();
        let (ready, execution) = {
            let mut state = self.inner.state.lock().await;
            let ready = state.register(tasks)?;
            (ready, state.execution().cloned())
        };
        tracing::debug!(
            workflow_id = %self.inner.workflow_id,
            registered = count,
            ready = ready.len(),
            "tasks registered"
        );

        if let Some(execution) = execution {
            dispatch(self, &execution, ready);
        }
        Ok(())
    }

    /// Forwards a custom event to the observer.
    pub fn emit_event(&self, task_id: &TaskId, name: &str, data: Value) {
        tracing::trace!(task_id = %task_id, event = name, "task event");
        self.inner.observer.on_event(task_id, name, &data);
    }

    pub(crate) fn observer(&self) -> &dyn Observer {
        self.inner.observer.as_ref()
    }

    pub(crate) fn state(&self) -> &Mutex<SchedulerState> {
        &self.inner.state
    }

    pub(crate) async fn record_output(&self, id: TaskId, output: TaskOutput) {
        self.inner.outputs.write().await.insert(id, output);
    }

    pub(crate) async fn clear_outputs(&self) {
        self.inner.outputs.write().await.clear();
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("workflow_id", &self.inner.workflow_id)
            .field("input_keys", &self.inner.input.len())
            .finish_non_exhaustive()
    }
}
