//! Task abstraction and execution trait for the workflow engine.
//!
//! Defines the interface every workflow task implements, along with the
//! identifier, status and result types the orchestrator tracks per task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dagflow_runtime::CancellationToken;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::workflow::context::RunContext;

/// Value produced by a successful task.
pub type TaskOutput = serde_json::Value;

/// Unique identifier for a workflow task.
///
/// TaskId wraps a string identifier and is used both as the registry key and
/// as the vertex of the dependency graph.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the TaskId and returns the underlying string.
    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&TaskId> for TaskId {
    fn from(id: &TaskId) -> Self {
        id.clone()
    }
}

/// Lifecycle of a task within one execution.
///
/// `Pending -> Running -> {Succeeded | Failed}`. A task enters `Running` at
/// most once per execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Registered, not started
    Pending,
    /// Handed to the worker pool
    Running,
    /// Finished without error
    Succeeded,
    /// Returned an error or panicked
    Failed,
}

impl TaskStatus {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Error types for task execution.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    /// Task execution failed with a message
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// Task stopped because its cancellation token fired
    #[error("Task cancelled")]
    Cancelled,

    /// Generic error wrapper
    #[error("Task error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Outcome of one task execution.
///
/// Built exactly once, right after the task returns or after its panic has
/// been caught, and never modified afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: TaskId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Output of the task; `null` when it failed
    pub output: TaskOutput,
    /// Error message; `None` on success
    pub error: Option<String>,
    /// Whether the error was produced by a caught panic
    pub panicked: bool,
}

impl TaskResult {
    /// Builds the result of a task that returned.
    pub(crate) fn from_outcome(
        id: TaskId,
        started_at: DateTime<Utc>,
        outcome: Result<TaskOutput, TaskError>,
    ) -> Self {
        let finished_at = Utc::now();
        match outcome {
            Ok(output) => Self {
                id,
                started_at,
                finished_at,
                output,
                error: None,
                panicked: false,
            },
            Err(err) => Self {
                id,
                started_at,
                finished_at,
                output: TaskOutput::Null,
                error: Some(err.to_string()),
                panicked: false,
            },
        }
    }

    /// Builds the synthetic result of a task whose action panicked.
    pub(crate) fn from_panic(id: TaskId, started_at: DateTime<Utc>, message: &str) -> Self {
        let error = format!("task {id} panicked: {message}");
        Self {
            id,
            started_at,
            finished_at: Utc::now(),
            output: TaskOutput::Null,
            error: Some(error),
            panicked: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Wall-clock time between start and finish.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Trait for workflow task execution.
///
/// Tasks are executed concurrently once every task they depend on has
/// succeeded. A task receives the execution's cancellation token and should
/// check it at convenient points; the engine never aborts a running task.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use dagflow_engine::workflow::{RunContext, TaskError, TaskId, TaskOutput, WorkflowTask};
/// use dagflow_runtime::CancellationToken;
///
/// struct Checksum;
///
/// #[async_trait]
/// impl WorkflowTask for Checksum {
///     fn id(&self) -> TaskId {
///         TaskId::new("checksum")
///     }
///
///     fn dependencies(&self) -> Vec<TaskId> {
///         vec![TaskId::new("download")]
///     }
///
///     async fn execute(
///         &self,
///         token: &CancellationToken,
///         context: &RunContext,
///     ) -> Result<TaskOutput, TaskError> {
///         if token.is_cancelled() {
///             return Err(TaskError::Cancelled);
///         }
///         let bytes = context.task_output("download").await.unwrap_or_default();
///         Ok(serde_json::json!(bytes.to_string().len()))
///     }
/// }
/// ```
#[async_trait]
pub trait WorkflowTask: Send + Sync {
    /// Returns the unique task identifier.
    fn id(&self) -> TaskId;

    /// Returns the ids this task depends on.
    ///
    /// Default implementation returns an empty vector (no dependencies).
    fn dependencies(&self) -> Vec<TaskId> {
        Vec::new()
    }

    /// Executes the task.
    ///
    /// # Arguments
    ///
    /// * `token` - Cancelled when the workflow fails or is cancelled
    /// * `context` - Workflow input, upstream outputs, shared data
    async fn execute(
        &self,
        token: &CancellationToken,
        context: &RunContext,
    ) -> Result<TaskOutput, TaskError>;
}
