//! Observer hooks for workflow instrumentation.
//!
//! Observers receive fire-and-forget notifications from the run loop and from
//! running tasks. They are called synchronously, so implementations should
//! return quickly, and nothing they do influences scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

use crate::workflow::executor::WorkflowResult;
use crate::workflow::task::{TaskId, TaskResult};

/// Receives workflow lifecycle notifications.
///
/// Every method has an empty default implementation.
#[allow(unused_variables)]
pub trait Observer: Send + Sync {
    fn on_workflow_started(&self, workflow_id: &str) {}

    fn on_workflow_completed(&self, workflow_id: &str, result: &WorkflowResult) {}

    /// Called right before the task is handed to the worker pool.
    fn on_task_started(&self, task_id: &TaskId) {}

    fn on_task_completed(&self, task_id: &TaskId, result: &TaskResult) {}

    /// Custom event emitted through [`RunContext::emit_event`](crate::workflow::RunContext::emit_event).
    fn on_event(&self, task_id: &TaskId, name: &str, data: &Value) {}
}

/// Observer that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Event recorded by [`EventLog`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        timestamp: DateTime<Utc>,
        workflow_id: String,
    },
    WorkflowCompleted {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        task_count: usize,
        error: Option<String>,
    },
    TaskStarted {
        timestamp: DateTime<Utc>,
        task_id: TaskId,
    },
    TaskCompleted {
        timestamp: DateTime<Utc>,
        task_id: TaskId,
        error: Option<String>,
    },
    Custom {
        timestamp: DateTime<Utc>,
        task_id: TaskId,
        name: String,
        data: Value,
    },
}

impl WorkflowEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WorkflowEvent::WorkflowStarted { timestamp, .. }
            | WorkflowEvent::WorkflowCompleted { timestamp, .. }
            | WorkflowEvent::TaskStarted { timestamp, .. }
            | WorkflowEvent::TaskCompleted { timestamp, .. }
            | WorkflowEvent::Custom { timestamp, .. } => *timestamp,
        }
    }
}

/// Observer that records every notification in memory.
///
/// Useful as an audit trail and for asserting execution order in tests.
///
/// # Example
///
/// ```
/// use dagflow_engine::workflow::{EventLog, Observer, TaskId};
///
/// let log = EventLog::new();
/// log.on_task_started(&TaskId::new("fetch"));
///
/// assert_eq!(log.started_order(), vec![TaskId::new("fetch")]);
/// assert!(log.to_json().unwrap().contains("task_started"));
/// ```
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: WorkflowEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Copy of all recorded events, oldest first.
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Task ids in the order they were started.
    pub fn started_order(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                WorkflowEvent::TaskStarted { task_id, .. } => Some(task_id),
                _ => None,
            })
            .collect()
    }

    /// Custom events as `(task_id, name, data)`.
    pub fn custom_events(&self) -> Vec<(TaskId, String, Value)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                WorkflowEvent::Custom {
                    task_id, name, data, ..
                } => Some((task_id, name, data)),
                _ => None,
            })
            .collect()
    }

    /// Serializes the log as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events())
    }
}

impl Observer for EventLog {
    fn on_workflow_started(&self, workflow_id: &str) {
        self.push(WorkflowEvent::WorkflowStarted {
            timestamp: Utc::now(),
            workflow_id: workflow_id.to_string(),
        });
    }

    fn on_workflow_completed(&self, workflow_id: &str, result: &WorkflowResult) {
        self.push(WorkflowEvent::WorkflowCompleted {
            timestamp: Utc::now(),
            workflow_id: workflow_id.to_string(),
            task_count: result.task_results.len(),
            error: result.error.as_ref().map(ToString::to_string),
        });
    }

    fn on_task_started(&self, task_id: &TaskId) {
        self.push(WorkflowEvent::TaskStarted {
            timestamp: Utc::now(),
            task_id: task_id.clone(),
        });
    }

    fn on_task_completed(&self, task_id: &TaskId, result: &TaskResult) {
        self.push(WorkflowEvent::TaskCompleted {
            timestamp: Utc::now(),
            task_id: task_id.clone(),
            error: result.error.clone(),
        });
    }

    fn on_event(&self, task_id: &TaskId, name: &str, data: &Value) {
        self.push(WorkflowEvent::Custom {
            timestamp: Utc::now(),
            task_id: task_id.clone(),
            name: name.to_string(),
            data: data.clone(),
        });
    }
}
