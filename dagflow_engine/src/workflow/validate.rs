//! Workflow validation before execution.
//!
//! Registration already refuses cycles, duplicates and self-dependencies, so
//! the only structural problem left at execution time is a dependency that
//! was declared but never registered.

use crate::workflow::dag::WorkflowError;
use crate::workflow::state::SchedulerState;
use crate::workflow::task::TaskId;

/// Validation report for workflow structure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// `(task, dependency)` pairs whose dependency is not registered
    missing_dependencies: Vec<(TaskId, TaskId)>,
    /// Graph vertices without a task
    placeholders: Vec<TaskId>,
}

impl ValidationReport {
    /// Returns whether the workflow can be executed.
    pub fn is_valid(&self) -> bool {
        self.missing_dependencies.is_empty()
    }

    pub fn missing_dependencies(&self) -> &[(TaskId, TaskId)] {
        &self.missing_dependencies
    }

    /// Ids referenced as dependencies but never registered.
    pub fn placeholders(&self) -> &[TaskId] {
        &self.placeholders
    }

    /// Converts the first problem into an error.
    pub fn into_result(self) -> Result<(), WorkflowError> {
        match self.missing_dependencies.into_iter().next() {
            Some((task, dependency)) => Err(WorkflowError::MissingDependency { task, dependency }),
            None => Ok(()),
        }
    }
}

/// Builds the report for the given scheduler state.
pub(crate) fn inspect(state: &SchedulerState) -> ValidationReport {
    ValidationReport {
        missing_dependencies: state.unresolved_dependencies(),
        placeholders: state.placeholders(),
    }
}
