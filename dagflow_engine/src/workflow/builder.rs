//! Fluent builder API for workflow construction.
//!
//! Collects the workflow id, input, observer and an initial set of tasks,
//! then registers the tasks in one batch.

use std::sync::Arc;
use std::time::Duration;

use dagflow_core::Store;
use uuid::Uuid;

use crate::workflow::dag::{Workflow, WorkflowError, DEFAULT_DRAIN_TIMEOUT};
use crate::workflow::observer::{NoopObserver, Observer};
use crate::workflow::state::SchedulerState;
use crate::workflow::task::WorkflowTask;

/// Fluent builder for constructing workflows.
///
/// Input that fails to parse does not fail [`build`](Self::build); the error
/// is kept and returned by the first call to
/// [`Workflow::execute`](crate::workflow::Workflow::execute).
///
/// # Example
///
/// ```
/// use dagflow_engine::workflow::{FunctionTask, WorkflowBuilder};
///
/// let workflow = WorkflowBuilder::new()
///     .id("nightly-report")
///     .input_json(r#"{"region": "eu"}"#)
///     .task(FunctionTask::noop("fetch"))
///     .task(FunctionTask::noop("report").depends_on("fetch"))
///     .build()
///     .unwrap();
///
/// assert_eq!(workflow.id(), "nightly-report");
/// assert_eq!(workflow.run_context().workflow_input().get_str("region"), "eu");
/// ```
pub struct WorkflowBuilder {
    id: Option<String>,
    input: Store,
    input_error: Option<WorkflowError>,
    observer: Arc<dyn Observer>,
    drain_timeout: Duration,
    tasks: Vec<Arc<dyn WorkflowTask>>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            id: None,
            input: Store::new(),
            input_error: None,
            observer: Arc::new(NoopObserver),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            tasks: Vec::new(),
        }
    }

    /// Sets the workflow id. A random UUID is used otherwise.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn input(mut self, input: Store) -> Self {
        self.input = input;
        self.input_error = None;
        self
    }

    /// Parses the workflow input from a JSON object.
    pub fn input_json(self, input: &str) -> Self {
        let parsed = Store::from_json(input);
        self.parsed_input(parsed)
    }

    /// Parses the workflow input from a YAML mapping.
    pub fn input_yaml(self, input: &str) -> Self {
        let parsed = Store::from_yaml(input);
        self.parsed_input(parsed)
    }

    fn parsed_input(mut self, parsed: dagflow_core::Result<Store>) -> Self {
        match parsed {
            Ok(store) => {
                self.input = store;
                self.input_error = None;
            }
            Err(err) => {
                tracing::debug!(error = %err, "workflow input rejected");
                self.input = Store::new();
                self.input_error = Some(WorkflowError::InvalidInput(err.to_string()));
            }
        }
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// How long a failed execution waits for tasks still in flight.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Adds a task. Dependencies may be declared before the tasks they name.
    pub fn task(mut self, task: impl WorkflowTask + 'static) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    /// Builds the workflow.
    ///
    /// # Errors
    ///
    /// Any registration error of the tasks given to [`task`](Self::task):
    /// `EmptyTaskId`, `DuplicateTask`, `SelfDependency` or `CycleDetected`.
    /// Unresolved dependencies are only reported by `execute`.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut state = SchedulerState::default();
        state.register(self.tasks)?;

        Ok(Workflow::from_parts(
            id,
            self.input,
            self.observer,
            state,
            self.input_error,
            self.drain_timeout,
        ))
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
