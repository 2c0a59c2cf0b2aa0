//! Concurrent workflow orchestration over a task dependency graph.
//!
//! The workflow module provides a DAG-based task scheduler that:
//! - Rejects cycles, duplicates and self-dependencies at registration time
//! - Runs every task as soon as all of its dependencies have succeeded
//! - Lets running tasks add new tasks to the workflow they belong to
//! - Cancels the remaining work on the first failure or panic
//!
//! # Architecture
//!
//! - [`Workflow`]: task registry and dependency graph
//! - [`WorkflowTask`]: async trait implemented by units of work
//! - [`RunContext`]: handle every task receives (input, outputs, shared data)
//! - [`Observer`]: lifecycle notifications, e.g. [`EventLog`]
//!
//! Tasks run on a [`WorkerPool`](dagflow_runtime::WorkerPool) supplied by
//! the caller of [`Workflow::execute`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dagflow_engine::workflow::{EventLog, FunctionTask, WorkflowBuilder};
//! use dagflow_runtime::{CancellationToken, TokioPool};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let log = Arc::new(EventLog::new());
//! let workflow = WorkflowBuilder::new()
//!     .observer(log.clone())
//!     .task(FunctionTask::noop("fetch"))
//!     .task(FunctionTask::noop("save").depends_on("fetch"))
//!     .build()?;
//!
//! let result = workflow
//!     .execute(&CancellationToken::default(), Arc::new(TokioPool::unbounded()))
//!     .await?;
//!
//! assert!(result.is_success());
//! assert_eq!(log.started_order().len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod dag;
pub mod executor;
pub mod observer;
pub(crate) mod state;
pub mod task;
pub mod tasks;
pub mod validate;

// Re-export core types for public API
pub use builder::WorkflowBuilder;
pub use context::RunContext;
pub use dag::{Workflow, WorkflowError, DEFAULT_DRAIN_TIMEOUT};
pub use executor::WorkflowResult;
pub use observer::{EventLog, NoopObserver, Observer, WorkflowEvent};
pub use task::{TaskError, TaskId, TaskOutput, TaskResult, TaskStatus, WorkflowTask};
pub use tasks::FunctionTask;
pub use validate::ValidationReport;
