//! Concurrent workflow execution.
//!
//! The run loop starts every task without dependencies, then waits on a
//! single completion channel. Each successful completion unlocks the
//! dependents whose dependencies have all succeeded. The first failure
//! cancels the execution token and stops the loop.
//!
//! # Execution Model
//!
//! 1. Return a deferred construction error, if any
//! 2. Validate that every dependency resolves to a registered task
//! 3. Start the dependency-free frontier (sorted by id)
//! 4. For each completion: record it, then start newly ready tasks
//! 5. Stop once every registered task succeeded, a task failed, or the
//!    caller cancelled; tasks added dynamically extend the run

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use dagflow_runtime::{
    panic_message, CancellationToken, CancellationTokenSource, Job, PanicHandler, PanicPayload,
    WorkerPool,
};
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;

use crate::workflow::context::RunContext;
use crate::workflow::dag::{Workflow, WorkflowError};
use crate::workflow::state::{Execution, ReadyTask};
use crate::workflow::task::{TaskId, TaskResult};
use crate::workflow::validate;

/// Result of one workflow execution.
///
/// `task_results` holds every task whose completion was observed, whether it
/// succeeded or not. `error` is the first failure, or the cancellation; a
/// result with an error only reaches callers inside
/// [`WorkflowError::Failed`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkflowResult {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub task_results: HashMap<TaskId, TaskResult>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<WorkflowError>,
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Ids of tasks that succeeded, sorted.
    pub fn succeeded(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .task_results
            .values()
            .filter(|r| r.is_success())
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of tasks that failed, sorted.
    pub fn failed(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .task_results
            .values()
            .filter(|r| !r.is_success())
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

fn serialize_error<S: Serializer>(error: &Option<WorkflowError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Hands `ready` tasks to the worker pool.
///
/// Each job sends exactly one [`TaskResult`]: the task's own, or a synthetic
/// one built by the panic handler.
pub(crate) fn dispatch(context: &RunContext, execution: &Execution, ready: Vec<ReadyTask>) {
    for (id, task) in ready {
        context.observer().on_task_started(&id);
        tracing::debug!(workflow_id = context.workflow_id(), task_id = %id, "dispatching task");

        // Set once the pool actually runs the job, after any wait for a worker
        let started_at = Arc::new(OnceLock::new());
        let job_started_at = started_at.clone();
        let job_id = id.clone();
        let job_context = context.clone();
        let job_token = execution.token.clone();
        let job_results = execution.results.clone();
        let job: Job = Box::pin(async move {
            let started_at = *job_started_at.get_or_init(Utc::now);
            let outcome = task.execute(&job_token, &job_context).await;
            // The loop may have stopped listening already
            let _ = job_results.send(TaskResult::from_outcome(job_id, started_at, outcome));
        });

        let panic_results = execution.results.clone();
        let on_panic: PanicHandler = Box::new(move |_: &CancellationToken, payload: PanicPayload| {
            let message = panic_message(&payload);
            let started_at = *started_at.get_or_init(Utc::now);
            let _ = panic_results.send(TaskResult::from_panic(id, started_at, &message));
        });

        execution.pool.run(execution.token.clone(), job, on_panic);
    }
}

impl Workflow {
    /// Executes every registered task, and every task added while running.
    ///
    /// Tasks run concurrently through `pool` as soon as all their
    /// dependencies have succeeded. The first task failure cancels the token
    /// handed to the other tasks; so does cancelling `parent`.
    ///
    /// # Returns
    ///
    /// - `Ok(WorkflowResult)` - every task succeeded
    /// - `Err(WorkflowError::Failed)` - a task failed or panicked, or the
    ///   caller cancelled; [`WorkflowError::cause`] names the reason and
    ///   [`WorkflowError::partial_result`] holds the results gathered so far
    /// - any other `Err(WorkflowError)` - the execution could not start:
    ///   deferred input error, unresolved dependency, or an execution already
    ///   in progress
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use dagflow_engine::workflow::{FunctionTask, TaskId, Workflow};
    /// use dagflow_runtime::{CancellationTokenSource, TokioPool};
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> anyhow::Result<()> {
    /// let workflow = Workflow::new("checkout");
    /// workflow
    ///     .add_task(FunctionTask::new("price", |_, _| async { Ok(json!(40)) }))
    ///     .await?;
    /// workflow
    ///     .add_task(
    ///         FunctionTask::new("total", |_, ctx| async move {
    ///             let price = ctx.task_output("price").await.unwrap_or_default();
    ///             Ok(json!(price.as_i64().unwrap_or(0) + 2))
    ///         })
    ///         .depends_on("price"),
    ///     )
    ///     .await?;
    ///
    /// let source = CancellationTokenSource::new();
    /// let result = workflow
    ///     .execute(&source.token(), Arc::new(TokioPool::unbounded()))
    ///     .await?;
    ///
    /// assert_eq!(result.task_results[&TaskId::new("total")].output, json!(42));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute(
        &self,
        parent: &CancellationToken,
        pool: Arc<dyn WorkerPool>,
    ) -> Result<WorkflowResult, WorkflowError> {
        if let Some(err) = &self.deferred_error {
            tracing::warn!(workflow_id = self.id(), error = %err, "refusing to execute");
            return Err(err.clone());
        }

        let source = CancellationTokenSource::child_of(parent);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let execution = Execution {
            pool,
            results: tx,
            token: source.token(),
        };

        let (frontier, task_count) = {
            let mut state = self.context.state().lock().await;
            if state.is_running() {
                return Err(WorkflowError::AlreadyRunning);
            }
            validate::inspect(&state).into_result()?;
            state.begin(execution.clone());
            (state.start_frontier(), state.task_count())
        };
        self.context.clear_outputs().await;

        let started_at = Utc::now();
        tracing::info!(workflow_id = self.id(), tasks = task_count, "workflow started");
        self.context.observer().on_workflow_started(self.id());
        dispatch(&self.context, &execution, frontier);

        let mut task_results = HashMap::new();
        let mut error = None;

        loop {
            if self.context.state().lock().await.all_completed() {
                break;
            }

            // Cancellation by the caller takes precedence over pending results
            let received = tokio::select! {
                biased;
                _ = parent.cancelled() => None,
                result = rx.recv() => result,
            };
            // The sender lives in the scheduler state, so `recv` never yields `None`
            let Some(result) = received else {
                tracing::warn!(workflow_id = self.id(), "workflow cancelled by caller");
                source.cancel();
                error = Some(WorkflowError::Cancelled);
                break;
            };

            self.context.observer().on_task_completed(&result.id, &result);

            if let Some(message) = &result.error {
                let err = if result.panicked {
                    WorkflowError::TaskPanicked {
                        task: result.id.clone(),
                        message: message.clone(),
                    }
                } else {
                    WorkflowError::TaskFailed {
                        task: result.id.clone(),
                        message: message.clone(),
                    }
                };
                tracing::warn!(workflow_id = self.id(), error = %err, "task failed, cancelling workflow");
                source.cancel();
                self.context.state().lock().await.fail(&result.id);
                task_results.insert(result.id.clone(), result);
                error = Some(err);
                break;
            }

            tracing::debug!(workflow_id = self.id(), task_id = %result.id, "task succeeded");
            self.context
                .record_output(result.id.clone(), result.output.clone())
                .await;
            let ready = self.context.state().lock().await.complete(&result.id);
            task_results.insert(result.id.clone(), result);
            dispatch(&self.context, &execution, ready);
        }

        if error.is_some() {
            self.drain(&mut rx, &mut task_results).await;
        }
        self.context.state().lock().await.finish();

        let result = WorkflowResult {
            id: self.id().to_string(),
            started_at,
            finished_at: Utc::now(),
            task_results,
            error,
        };
        match &result.error {
            None => tracing::info!(
                workflow_id = self.id(),
                tasks = result.task_results.len(),
                elapsed_ms = result.duration().num_milliseconds(),
                "workflow completed"
            ),
            Some(err) => tracing::info!(
                workflow_id = self.id(),
                tasks = result.task_results.len(),
                error = %err,
                "workflow stopped"
            ),
        }
        self.context
            .observer()
            .on_workflow_completed(self.id(), &result);

        match result.error.clone() {
            None => Ok(result),
            Some(source) => Err(WorkflowError::Failed {
                source: Box::new(source),
                result: Box::new(result),
            }),
        }
    }

    /// Collects results of tasks still in flight after the loop stopped.
    ///
    /// Gives up once the drain timeout elapses; nothing new is started.
    async fn drain(
        &self,
        rx: &mut mpsc::UnboundedReceiver<TaskResult>,
        task_results: &mut HashMap<TaskId, TaskResult>,
    ) {
        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        while self.context.state().lock().await.in_flight() > 0 {
            let Ok(Some(result)) = tokio::time::timeout_at(deadline, rx.recv()).await else {
                break;
            };
            self.context.observer().on_task_completed(&result.id, &result);
            {
                let mut state = self.context.state().lock().await;
                if result.is_success() {
                    state.complete(&result.id);
                } else {
                    state.fail(&result.id);
                }
            }
            task_results.insert(result.id.clone(), result);
        }

        let abandoned = self.context.state().lock().await.in_flight();
        if abandoned > 0 {
            tracing::warn!(
                workflow_id = self.id(),
                abandoned,
                "tasks still running after cancellation"
            );
        }
    }
}
