//! Dagflow engine - concurrent workflow orchestration
//!
//! Builds on [`dagflow_core`] (dependency graph, key-value stores) and
//! [`dagflow_runtime`] (worker pools, cancellation) to run workflows of
//! interdependent async tasks.
//!
//! See the [`workflow`] module for the API.

pub mod workflow;

// Re-export commonly used types
pub use dagflow_core::{SharedStore, Store};
pub use dagflow_runtime::{
    CancellationToken, CancellationTokenSource, RuntimeConfig, TokioPool, WorkerPool,
};
pub use workflow::{
    FunctionTask, RunContext, TaskError, TaskId, TaskResult, Workflow, WorkflowBuilder,
    WorkflowError, WorkflowResult, WorkflowTask,
};
