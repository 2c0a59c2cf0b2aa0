//! End-to-end tests of workflow execution.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{cancellable_task, ids, pool, sleeping_task, stopped, ConcurrencyGauge};
use dagflow_engine::workflow::{
    EventLog, FunctionTask, TaskError, TaskId, TaskStatus, Workflow, WorkflowBuilder,
    WorkflowError, WorkflowEvent,
};
use dagflow_runtime::{CancellationToken, CancellationTokenSource, PoolEvent, TokioPool};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

fn position(events: &[WorkflowEvent], wanted: impl Fn(&WorkflowEvent) -> bool) -> usize {
    events
        .iter()
        .position(wanted)
        .expect("event not recorded")
}

fn started(id: &'static str) -> impl Fn(&WorkflowEvent) -> bool {
    move |event| matches!(event, WorkflowEvent::TaskStarted { task_id, .. } if task_id.as_str() == id)
}

fn completed(id: &'static str) -> impl Fn(&WorkflowEvent) -> bool {
    move |event| matches!(event, WorkflowEvent::TaskCompleted { task_id, .. } if task_id.as_str() == id)
}

#[tokio::test]
async fn test_order_pipeline_respects_dependencies() {
    let log = Arc::new(EventLog::new());
    let workflow = WorkflowBuilder::new()
        .id("order-pipeline")
        .input_json(r#"{"order_id": 981}"#)
        .observer(log.clone())
        .task(FunctionTask::new("fetch_data", |_, ctx| async move {
            Ok(json!({ "order": ctx.workflow_input().get_i64("order_id"), "items": 3 }))
        }))
        .task(
            FunctionTask::new("validate", |_, ctx| async move {
                let data = ctx.task_output("fetch_data").await.unwrap_or_default();
                Ok(json!(data["items"].as_i64().unwrap_or(0) > 0))
            })
            .depends_on("fetch_data"),
        )
        .task(sleeping_task("save", 20).depends_on("validate"))
        .task(sleeping_task("email", 10).depends_on("validate"))
        .task(
            FunctionTask::new("report", |_, ctx| async move {
                let save = ctx.task_output("save").await.unwrap_or_default();
                let email = ctx.task_output("email").await.unwrap_or_default();
                Ok(json!([save, email]))
            })
            .with_dependencies(["save", "email"]),
        )
        .build()
        .unwrap();

    let result = workflow
        .execute(&CancellationToken::default(), pool())
        .await
        .unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.task_results.len(), 5);
    assert_eq!(result.task_results[&TaskId::new("validate")].output, json!(true));
    assert_eq!(result.task_results[&TaskId::new("report")].output, json!(["save", "email"]));

    let order = log.started_order();
    assert_eq!(order[..2], ids(&["fetch_data", "validate"])[..]);
    assert_eq!(order[4], TaskId::new("report"));

    let events = log.events();
    let report_start = position(&events, started("report"));
    assert!(position(&events, completed("save")) < report_start);
    assert!(position(&events, completed("email")) < report_start);
    assert!(position(&events, completed("validate")) < position(&events, started("save")));
    assert!(matches!(events.last(), Some(WorkflowEvent::WorkflowCompleted { error: None, .. })));

    let validate = &result.task_results[&TaskId::new("validate")];
    let save = &result.task_results[&TaskId::new("save")];
    let email = &result.task_results[&TaskId::new("email")];
    let report = &result.task_results[&TaskId::new("report")];
    assert!(validate.finished_at <= save.started_at);
    assert!(validate.finished_at <= email.started_at);
    // Save and Email overlap
    assert!(save.started_at < email.finished_at && email.started_at < save.finished_at);
    assert!(save.finished_at <= report.started_at);
    assert!(email.finished_at <= report.started_at);
}

#[tokio::test]
async fn test_frontier_starts_in_id_order() {
    let log = Arc::new(EventLog::new());
    let workflow = WorkflowBuilder::new()
        .observer(log.clone())
        .task(FunctionTask::noop("gamma"))
        .task(FunctionTask::noop("alpha"))
        .task(FunctionTask::noop("beta"))
        .build()
        .unwrap();

    workflow
        .execute(&CancellationToken::default(), pool())
        .await
        .unwrap();

    assert_eq!(log.started_order(), ids(&["alpha", "beta", "gamma"]));
}

#[tokio::test]
async fn test_independent_tasks_run_in_parallel() {
    let gauge = ConcurrencyGauge::default();
    let workflow = WorkflowBuilder::new()
        .task(gauge.task("a", 100))
        .task(gauge.task("b", 100))
        .task(gauge.task("c", 100))
        .build()
        .unwrap();

    let started = Instant::now();
    let result = workflow
        .execute(&CancellationToken::default(), pool())
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(gauge.peak(), 3);
    assert!(started.elapsed() < Duration::from_millis(280));
}

#[tokio::test]
async fn test_bounded_pool_limits_parallelism() {
    let gauge = ConcurrencyGauge::default();
    let mut builder = WorkflowBuilder::new();
    for i in 0..6 {
        builder = builder.task(gauge.task(&format!("job-{i}"), 30));
    }
    let workflow = builder.build().unwrap();
    let pool = Arc::new(TokioPool::with_limits(2, 16));

    let result = workflow
        .execute(&CancellationToken::default(), pool.clone())
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.succeeded().len(), 6);
    assert!(gauge.peak() <= 2, "peak was {}", gauge.peak());
    assert_eq!(pool.metrics().count(PoolEvent::Submitted), 6);
    assert_eq!(pool.metrics().count(PoolEvent::Overflowed), 0);
}

#[tokio::test]
async fn test_failure_cancels_running_tasks_quickly() {
    let workflow = WorkflowBuilder::new()
        .task(FunctionTask::new("flaky", |_, _| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(TaskError::ExecutionFailed("upstream timeout".into()))
        }))
        .task(cancellable_task("slow"))
        .task(FunctionTask::noop("after_slow").depends_on("slow"))
        .build()
        .unwrap();

    let started = Instant::now();
    let (cause, result) = stopped(
        workflow
            .execute(&CancellationToken::default(), pool())
            .await,
    );

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        cause,
        WorkflowError::TaskFailed {
            task: "flaky".into(),
            message: "Task execution failed: upstream timeout".into(),
        }
    );
    assert_eq!(result.error, Some(cause));

    let slow = &result.task_results[&TaskId::new("slow")];
    assert_eq!(slow.error.as_deref(), Some("Task cancelled"));
    assert!(!result.task_results.contains_key(&TaskId::new("after_slow")));
    assert_eq!(workflow.task_status("after_slow").await, Some(TaskStatus::Pending));
    assert_eq!(workflow.task_status("flaky").await, Some(TaskStatus::Failed));
}

#[tokio::test]
async fn test_panic_is_contained() {
    let log = Arc::new(EventLog::new());
    let workflow = WorkflowBuilder::new()
        .observer(log.clone())
        .task(FunctionTask::new("explode", |_, _| async {
            if std::hint::black_box(true) {
                panic!("exploded while parsing");
            }
            Ok(Value::Null)
        }))
        .task(FunctionTask::noop("cleanup").depends_on("explode"))
        .build()
        .unwrap();

    let (cause, result) = stopped(
        workflow
            .execute(&CancellationToken::default(), pool())
            .await,
    );

    match cause {
        WorkflowError::TaskPanicked { ref task, ref message } => {
            assert_eq!(task.as_str(), "explode");
            assert!(message.contains("exploded while parsing"), "{message}");
        }
        ref other => panic!("unexpected error: {other:?}"),
    }
    assert!(result.task_results[&TaskId::new("explode")].panicked);
    assert!(!log.started_order().contains(&TaskId::new("cleanup")));

    // The engine stays usable after a panic
    let again = Workflow::new("after-panic");
    again.add_task(FunctionTask::noop("ok")).await.unwrap();
    let result = again
        .execute(&CancellationToken::default(), pool())
        .await
        .unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn test_cancelled_parent_starts_nothing() {
    let log = Arc::new(EventLog::new());
    let workflow = WorkflowBuilder::new()
        .observer(log.clone())
        .task(FunctionTask::noop("a"))
        .task(FunctionTask::noop("b").depends_on("a"))
        .build()
        .unwrap();

    let grandparent = CancellationTokenSource::new();
    let parent = CancellationTokenSource::child_of(&grandparent.token());
    grandparent.cancel();

    let (cause, result) = stopped(workflow.execute(&parent.token(), pool()).await);

    assert_eq!(cause, WorkflowError::Cancelled);
    assert!(result.task_results.is_empty());
    assert!(log.started_order().is_empty());
    assert_eq!(workflow.task_status("a").await, Some(TaskStatus::Pending));
}

#[tokio::test]
async fn test_cancel_while_running() {
    let source = CancellationTokenSource::new();
    let workflow = WorkflowBuilder::new()
        .task(cancellable_task("wait"))
        .task(FunctionTask::noop("never").depends_on("wait"))
        .build()
        .unwrap();

    let token = source.token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        source.cancel();
    });

    let started = Instant::now();
    let outcome = workflow.execute(&token, pool()).await;
    assert!(matches!(outcome, Err(ref err) if err.to_string() == "Workflow cancelled"));
    let (cause, result) = stopped(outcome);

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(cause, WorkflowError::Cancelled);
    assert_eq!(
        result.task_results[&TaskId::new("wait")].error.as_deref(),
        Some("Task cancelled")
    );
    assert_eq!(workflow.task_status("never").await, Some(TaskStatus::Pending));
    assert!(!workflow.is_running().await);
}

#[tokio::test]
async fn test_missing_dependency_fails_execute() {
    let workflow = Workflow::new("incomplete");
    workflow
        .add_task(FunctionTask::noop("report").depends_on("fetch"))
        .await
        .unwrap();

    let err = workflow
        .execute(&CancellationToken::default(), pool())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        WorkflowError::MissingDependency {
            task: "report".into(),
            dependency: "fetch".into(),
        }
    );
    assert!(!workflow.is_running().await);

    // Registering the dependency later makes the workflow runnable
    workflow.add_task(FunctionTask::noop("fetch")).await.unwrap();
    let result = workflow
        .execute(&CancellationToken::default(), pool())
        .await
        .unwrap();
    assert_eq!(result.succeeded(), ids(&["fetch", "report"]));
}

#[tokio::test]
async fn test_invalid_yaml_input_is_reported_by_execute() {
    let workflow = WorkflowBuilder::new()
        .input_yaml("region: [eu, us")
        .task(FunctionTask::noop("a"))
        .build()
        .unwrap();

    let err = workflow
        .execute(&CancellationToken::default(), pool())
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::InvalidInput(_)), "{err:?}");
    assert!(workflow.run_context().workflow_input().is_empty());
}

#[tokio::test]
async fn test_second_execute_is_rejected_while_running() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let gate = release.clone();

    let workflow = Workflow::new("exclusive");
    workflow
        .add_task(FunctionTask::new("hold", move |_, _| {
            let started_tx = started_tx.clone();
            let gate = gate.clone();
            async move {
                let _ = started_tx.send(());
                gate.notified().await;
                Ok(json!("released"))
            }
        }))
        .await
        .unwrap();

    let token = CancellationToken::default();
    let first = workflow.execute(&token, pool());
    let second = async {
        started_rx.recv().await;
        let outcome = workflow.execute(&token, pool()).await;
        release.notify_one();
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(second.unwrap_err(), WorkflowError::AlreadyRunning);
    let first = first.unwrap();
    assert!(first.is_success());
    assert_eq!(first.task_results[&TaskId::new("hold")].output, json!("released"));
}

#[tokio::test]
async fn test_workflow_can_run_again() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let workflow = Workflow::new("repeat");
    workflow
        .add_task(FunctionTask::new("count", move |_, _| {
            let counter = counter.clone();
            async move { Ok(json!(counter.fetch_add(1, Ordering::SeqCst) + 1)) }
        }))
        .await
        .unwrap();

    for expected in 1..=2 {
        let result = workflow
            .execute(&CancellationToken::default(), pool())
            .await
            .unwrap();
        assert_eq!(result.task_results[&TaskId::new("count")].output, json!(expected));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shared_data_between_tasks() {
    let workflow = WorkflowBuilder::new()
        .task(FunctionTask::new("produce", |_, ctx| async move {
            ctx.shared_data().set("rows", json!(120)).await;
            Ok(Value::Null)
        }))
        .task(
            FunctionTask::new("consume", |_, ctx| async move {
                Ok(json!(ctx.shared_data().get_i64("rows").await * 2))
            })
            .depends_on("produce"),
        )
        .build()
        .unwrap();

    let result = workflow
        .execute(&CancellationToken::default(), pool())
        .await
        .unwrap();

    assert_eq!(result.task_results[&TaskId::new("consume")].output, json!(240));
    assert_eq!(workflow.run_context().shared_data().get_i64("rows").await, 120);
}
