//! Built-in task implementations.

use async_trait::async_trait;
use dagflow_runtime::CancellationToken;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::workflow::context::RunContext;
use crate::workflow::task::{TaskError, TaskId, TaskOutput, WorkflowTask};

type TaskFuture = Pin<Box<dyn Future<Output = Result<TaskOutput, TaskError>> + Send>>;
type TaskFn = Box<dyn Fn(CancellationToken, RunContext) -> TaskFuture + Send + Sync>;

/// Task that wraps an async closure.
///
/// The closure receives owned handles to the cancellation token and the run
/// context, so the returned future may hold on to them freely. A task built
/// with [`FunctionTask::noop`] has no action and succeeds with `null`.
///
/// # Example
///
/// ```
/// use dagflow_engine::workflow::FunctionTask;
/// use serde_json::json;
///
/// let fetch = FunctionTask::new("fetch", |_token, ctx| async move {
///     let url = ctx.workflow_input().get_str("url");
///     Ok(json!({ "url": url, "rows": 120 }))
/// });
///
/// let validate = FunctionTask::new("validate", |_token, ctx| async move {
///     let fetched = ctx.task_output("fetch").await.unwrap_or_default();
///     Ok(json!(fetched["rows"].as_i64().unwrap_or(0) > 0))
/// })
/// .depends_on("fetch");
/// ```
pub struct FunctionTask {
    id: TaskId,
    dependencies: Vec<TaskId>,
    action: Option<TaskFn>,
}

impl FunctionTask {
    /// Creates a task running `f`.
    pub fn new<F, Fut>(id: impl Into<TaskId>, f: F) -> Self
    where
        F: Fn(CancellationToken, RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
    {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            action: Some(Box::new(move |token, ctx| Box::pin(f(token, ctx)))),
        }
    }

    /// Creates a task without an action.
    pub fn noop(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            action: None,
        }
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, dependency: impl Into<TaskId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Adds several dependencies, keeping their order.
    pub fn with_dependencies<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<TaskId>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for FunctionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTask")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("noop", &self.action.is_none())
            .finish()
    }
}

#[async_trait]
impl WorkflowTask for FunctionTask {
    fn id(&self) -> TaskId {
        self.id.clone()
    }

    fn dependencies(&self) -> Vec<TaskId> {
        self.dependencies.clone()
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        context: &RunContext,
    ) -> Result<TaskOutput, TaskError> {
        match &self.action {
            Some(action) => action(token.clone(), context.clone()).await,
            None => Ok(TaskOutput::Null),
        }
    }
}
