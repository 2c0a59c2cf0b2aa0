//! Scheduler bookkeeping shared by the run loop and task registration.
//!
//! [`SchedulerState`] holds the dependency graph, the task registry and the
//! per-execution started/completed/failed sets. It is always accessed through
//! the single mutex owned by the run context, so every readiness decision and
//! every graph mutation happens under the same lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dagflow_core::Dag;
use dagflow_runtime::{CancellationToken, WorkerPool};
use tokio::sync::mpsc;

use crate::workflow::dag::WorkflowError;
use crate::workflow::task::{TaskId, TaskResult, TaskStatus, WorkflowTask};

/// A task that may be handed to the worker pool.
pub(crate) type ReadyTask = (TaskId, Arc<dyn WorkflowTask>);

/// Handles of the execution in progress.
#[derive(Clone)]
pub(crate) struct Execution {
    pub(crate) pool: Arc<dyn WorkerPool>,
    pub(crate) results: mpsc::UnboundedSender<TaskResult>,
    pub(crate) token: CancellationToken,
}

/// Changes made while registering a batch, undone if the batch is rejected.
#[derive(Default)]
struct Journal {
    vertices: Vec<TaskId>,
    edges: Vec<(TaskId, TaskId)>,
    tasks: Vec<TaskId>,
}

#[derive(Default)]
pub(crate) struct SchedulerState {
    graph: Dag<TaskId>,
    registry: HashMap<TaskId, Arc<dyn WorkflowTask>>,
    started: HashSet<TaskId>,
    completed: HashSet<TaskId>,
    failed: HashSet<TaskId>,
    execution: Option<Execution>,
}

impl SchedulerState {
    /// Registers `tasks` as one all-or-nothing batch.
    ///
    /// While an execution is accepting work, returns the newly registered
    /// tasks that are ready to run; they are already marked started.
    pub(crate) fn register(
        &mut self,
        tasks: Vec<Arc<dyn WorkflowTask>>,
    ) -> Result<Vec<ReadyTask>, WorkflowError> {
        let batch: HashSet<TaskId> = tasks.iter().map(|t| t.id()).collect();
        let mut journal = Journal::default();

        for task in tasks {
            if let Err(err) = self.register_one(task, &batch, &mut journal) {
                self.rollback(journal);
                return Err(err);
            }
        }

        if !self.accepting_work() {
            return Ok(Vec::new());
        }
        let ready = journal
            .tasks
            .iter()
            .filter(|id| self.is_ready(id))
            .cloned()
            .collect::<Vec<_>>();
        Ok(self.start_all(ready))
    }

    fn register_one(
        &mut self,
        task: Arc<dyn WorkflowTask>,
        batch: &HashSet<TaskId>,
        journal: &mut Journal,
    ) -> Result<(), WorkflowError> {
        let id = task.id();
        if id.is_empty() {
            return Err(WorkflowError::EmptyTaskId);
        }
        if self.registry.contains_key(&id) {
            return Err(WorkflowError::DuplicateTask(id));
        }

        let dependencies = task.dependencies();
        if dependencies.contains(&id) {
            return Err(WorkflowError::SelfDependency(id));
        }
        // A placeholder would never become ready once the run is underway
        if self.execution.is_some() {
            if let Some(dependency) = dependencies
                .iter()
                .find(|dep| !self.registry.contains_key(*dep) && !batch.contains(*dep))
            {
                return Err(WorkflowError::MissingDependency {
                    task: id,
                    dependency: dependency.clone(),
                });
            }
        }

        if self.graph.add_vertex(id.clone()) {
            journal.vertices.push(id.clone());
        }
        self.registry.insert(id.clone(), task);
        journal.tasks.push(id.clone());

        for dependency in dependencies {
            let placeholder = !self.graph.contains(&dependency);
            if self.graph.add_edge(dependency.clone(), id.clone()).is_err() {
                return Err(WorkflowError::CycleDetected {
                    task: id,
                    dependency,
                });
            }
            if placeholder {
                journal.vertices.push(dependency.clone());
            }
            journal.edges.push((dependency, id.clone()));
        }

        Ok(())
    }

    fn rollback(&mut self, journal: Journal) {
        for (from, to) in journal.edges.iter().rev() {
            self.graph.remove_edge(from, to);
        }
        for id in &journal.tasks {
            self.registry.remove(id);
        }
        for vertex in journal.vertices.iter().rev() {
            self.graph.remove_vertex(vertex);
        }
    }

    fn accepting_work(&self) -> bool {
        self.execution
            .as_ref()
            .is_some_and(|execution| !execution.token.is_cancelled())
    }

    /// Registered, not yet started, and every dependency has succeeded.
    fn is_ready(&self, id: &TaskId) -> bool {
        self.registry.contains_key(id)
            && !self.started.contains(id)
            && self
                .graph
                .reverse_neighbors(id)
                .iter()
                .all(|dep| self.completed.contains(dep))
    }

    fn start_all(&mut self, ids: Vec<TaskId>) -> Vec<ReadyTask> {
        let mut ready = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.started.insert(id.clone()) {
                continue;
            }
            if let Some(task) = self.registry.get(&id) {
                ready.push((id, task.clone()));
            }
        }
        ready
    }

    /// Starts an execution, clearing the bookkeeping of any previous one.
    pub(crate) fn begin(&mut self, execution: Execution) {
        self.started.clear();
        self.completed.clear();
        self.failed.clear();
        self.execution = Some(execution);
    }

    /// Ends the current execution.
    pub(crate) fn finish(&mut self) {
        self.execution = None;
    }

    pub(crate) fn execution(&self) -> Option<&Execution> {
        self.execution.as_ref()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.execution.is_some()
    }

    /// Starts every registered task without dependencies, sorted by id.
    pub(crate) fn start_frontier(&mut self) -> Vec<ReadyTask> {
        if !self.accepting_work() {
            return Vec::new();
        }
        let mut frontier: Vec<TaskId> = self
            .graph
            .zero_incoming()
            .into_iter()
            .filter(|id| self.registry.contains_key(id))
            .collect();
        frontier.sort();
        self.start_all(frontier)
    }

    /// Marks `id` as succeeded and starts the dependents it unblocked.
    pub(crate) fn complete(&mut self, id: &TaskId) -> Vec<ReadyTask> {
        self.completed.insert(id.clone());
        if !self.accepting_work() {
            return Vec::new();
        }
        let unblocked: Vec<TaskId> = self
            .graph
            .neighbors(id)
            .iter()
            .filter(|dependent| self.is_ready(dependent))
            .cloned()
            .collect();
        self.start_all(unblocked)
    }

    pub(crate) fn fail(&mut self, id: &TaskId) {
        self.failed.insert(id.clone());
    }

    /// True once every registered task has succeeded.
    pub(crate) fn all_completed(&self) -> bool {
        self.completed.len() == self.registry.len()
    }

    /// Tasks started but not yet reported.
    pub(crate) fn in_flight(&self) -> usize {
        self.started
            .len()
            .saturating_sub(self.completed.len() + self.failed.len())
    }

    pub(crate) fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        if !self.registry.contains_key(id) {
            return None;
        }
        let status = if self.failed.contains(id) {
            TaskStatus::Failed
        } else if self.completed.contains(id) {
            TaskStatus::Succeeded
        } else if self.started.contains(id) {
            TaskStatus::Running
        } else {
            TaskStatus::Pending
        };
        Some(status)
    }

    pub(crate) fn task_count(&self) -> usize {
        self.registry.len()
    }

    /// Registered tasks in topological order.
    pub(crate) fn ordered_tasks(&self) -> Vec<Arc<dyn WorkflowTask>> {
        self.graph
            .topo_sort()
            .into_iter()
            .filter_map(|id| self.registry.get(&id).cloned())
            .collect()
    }

    /// `(task, dependency)` pairs whose dependency is not registered, in
    /// registration order.
    pub(crate) fn unresolved_dependencies(&self) -> Vec<(TaskId, TaskId)> {
        self.graph
            .vertices()
            .iter()
            .filter(|id| self.registry.contains_key(*id))
            .flat_map(|id| {
                self.graph
                    .reverse_neighbors(id)
                    .iter()
                    .filter(|dep| !self.registry.contains_key(*dep))
                    .map(move |dep| (id.clone(), dep.clone()))
            })
            .collect()
    }

    /// Graph vertices without a registered task.
    pub(crate) fn placeholders(&self) -> Vec<TaskId> {
        self.graph
            .vertices()
            .iter()
            .filter(|id| !self.registry.contains_key(*id))
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn graph(&self) -> &Dag<TaskId> {
        &self.graph
    }
}
