//! Workflow definition: task registration and inspection.
//!
//! A [`Workflow`] owns the dependency graph and the task registry (through
//! its [`RunContext`]). Tasks can be registered before an execution or, from
//! inside running tasks, while one is in progress. Execution itself lives in
//! [`executor`](crate::workflow::executor).

use std::sync::Arc;
use std::time::Duration;

use dagflow_core::Store;
use thiserror::Error;

use crate::workflow::context::RunContext;
use crate::workflow::executor::WorkflowResult;
use crate::workflow::observer::{NoopObserver, Observer};
use crate::workflow::state::SchedulerState;
use crate::workflow::task::{TaskId, TaskStatus, WorkflowTask};
use crate::workflow::validate::{self, ValidationReport};

/// How long a stopped execution keeps collecting results of tasks still in flight.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Error types for workflow operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Task registered without an id
    #[error("Task id must not be empty")]
    EmptyTaskId,

    /// A task with this id is already registered
    #[error("Duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// Task lists itself as a dependency
    #[error("Task {0} depends on itself")]
    SelfDependency(TaskId),

    /// Dependency edge would close a cycle
    #[error("Cycle detected: task {task} cannot depend on {dependency}")]
    CycleDetected { task: TaskId, dependency: TaskId },

    /// Dependency refers to a task that is not registered
    #[error("Missing dependency: task {task} depends on unknown task {dependency}")]
    MissingDependency { task: TaskId, dependency: TaskId },

    /// Workflow input could not be parsed
    #[error("Invalid workflow input: {0}")]
    InvalidInput(String),

    /// An execution of this workflow is already in progress
    #[error("Workflow is already running")]
    AlreadyRunning,

    /// A task returned an error
    #[error("Task {task} failed: {message}")]
    TaskFailed { task: TaskId, message: String },

    /// A task panicked
    #[error("Task {task} panicked: {message}")]
    TaskPanicked { task: TaskId, message: String },

    /// The caller cancelled the execution
    #[error("Workflow cancelled")]
    Cancelled,

    /// An execution stopped early; carries what had completed by then
    #[error("{source}")]
    Failed {
        source: Box<WorkflowError>,
        result: Box<WorkflowResult>,
    },
}

impl WorkflowError {
    /// Returns true for errors raised while registering tasks.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            WorkflowError::EmptyTaskId
                | WorkflowError::DuplicateTask(_)
                | WorkflowError::SelfDependency(_)
                | WorkflowError::CycleDetected { .. }
                | WorkflowError::MissingDependency { .. }
        )
    }

    /// The underlying error, looking through [`WorkflowError::Failed`].
    pub fn cause(&self) -> &WorkflowError {
        match self {
            WorkflowError::Failed { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Results gathered before an execution stopped early.
    pub fn partial_result(&self) -> Option<&WorkflowResult> {
        match self {
            WorkflowError::Failed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Id of the task the error is about, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            WorkflowError::Failed { source, .. } => source.task_id(),
            WorkflowError::DuplicateTask(id) | WorkflowError::SelfDependency(id) => Some(id),
            WorkflowError::CycleDetected { task, .. }
            | WorkflowError::MissingDependency { task, .. }
            | WorkflowError::TaskFailed { task, .. }
            | WorkflowError::TaskPanicked { task, .. } => Some(task),
            _ => None,
        }
    }
}

/// Directed acyclic graph of tasks plus the context they run in.
///
/// All methods take `&self`; registration and execution are serialized
/// internally, so a `Workflow` can be shared behind an `Arc`.
///
/// # Example
///
/// ```
/// use dagflow_engine::workflow::{FunctionTask, Workflow, WorkflowError};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), WorkflowError> {
/// let workflow = Workflow::new("etl");
/// workflow.add_task(FunctionTask::noop("extract")).await?;
/// workflow.add_task(FunctionTask::noop("load").depends_on("extract")).await?;
///
/// // Closing the loop is refused and leaves the workflow untouched
/// let err = workflow
///     .add_task(FunctionTask::noop("audit").depends_on("load").depends_on("audit"))
///     .await
///     .unwrap_err();
/// assert!(err.is_registration_error());
///
/// let order: Vec<String> = workflow.task_ids().await.iter().map(|id| id.to_string()).collect();
/// assert_eq!(order, vec!["extract", "load"]);
/// # Ok(())
/// # }
/// ```
pub struct Workflow {
    pub(in crate::workflow) context: RunContext,
    /// Construction error reported by the first `execute`
    pub(in crate::workflow) deferred_error: Option<WorkflowError>,
    pub(in crate::workflow) drain_timeout: Duration,
}

impl Workflow {
    /// Creates an empty workflow with no input and no observer.
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_parts(
            id.into(),
            Store::new(),
            Arc::new(NoopObserver),
            SchedulerState::default(),
            None,
            DEFAULT_DRAIN_TIMEOUT,
        )
    }

    pub(in crate::workflow) fn from_parts(
        id: String,
        input: Store,
        observer: Arc<dyn Observer>,
        state: SchedulerState,
        deferred_error: Option<WorkflowError>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            context: RunContext::new(id, input, observer, state),
            deferred_error,
            drain_timeout,
        }
    }

    pub fn id(&self) -> &str {
        self.context.workflow_id()
    }

    /// Registers a task.
    ///
    /// # Errors
    ///
    /// - `WorkflowError::EmptyTaskId` - the id is empty
    /// - `WorkflowError::DuplicateTask` - the id is already registered
    /// - `WorkflowError::SelfDependency` - the task depends on itself
    /// - `WorkflowError::CycleDetected` - a dependency would close a cycle
    /// - `WorkflowError::MissingDependency` - during an execution, a
    ///   dependency is not registered
    ///
    /// On error nothing is registered.
    pub async fn add_task(&self, task: impl WorkflowTask + 'static) -> Result<(), WorkflowError> {
        self.context.add_task(task).await
    }

    /// Registers a batch of tasks, all or nothing.
    pub async fn add_tasks(&self, tasks: Vec<Arc<dyn WorkflowTask>>) -> Result<(), WorkflowError> {
        self.context.add_tasks(tasks).await
    }

    /// Registered tasks in topological order.
    ///
    /// Dependencies that have no registered task yet are left out.
    pub async fn tasks(&self) -> Vec<Arc<dyn WorkflowTask>> {
        self.context.state().lock().await.ordered_tasks()
    }

    /// Ids of [`tasks`](Self::tasks).
    pub async fn task_ids(&self) -> Vec<TaskId> {
        self.tasks().await.iter().map(|task| task.id()).collect()
    }

    pub async fn task_count(&self) -> usize {
        self.context.state().lock().await.task_count()
    }

    /// Status of a task in the current or most recent execution.
    pub async fn task_status(&self, id: impl Into<TaskId>) -> Option<TaskStatus> {
        self.context.state().lock().await.status(&id.into())
    }

    pub async fn is_running(&self) -> bool {
        self.context.state().lock().await.is_running()
    }

    /// Checks that every dependency resolves to a registered task.
    pub async fn validate(&self) -> ValidationReport {
        let state = self.context.state().lock().await;
        validate::inspect(&state)
    }

    /// Handle to the context tasks run with.
    pub fn run_context(&self) -> RunContext {
        self.context.clone()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id())
            .field("deferred_error", &self.deferred_error)
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}
