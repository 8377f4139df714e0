//! Service layer turning raw producer and worker requests into store calls.

use crate::task::{
    domain::{
        Sticker, Task, TaskDomainError, TaskDraft, TaskId, TaskOutcome, TaskState, TaskUpdate,
        WorkerId,
    },
    ports::{StateCounts, TaskStore, TaskStoreError},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Request payload for a worker report on a held task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTaskRequest {
    task_id: String,
    worker: String,
    status: Option<String>,
    outcome: Option<TaskOutcome>,
}

impl UpdateTaskRequest {
    /// Creates a progress report for `task_id` from `worker`.
    #[must_use]
    pub fn new(task_id: impl Into<String>, worker: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            worker: worker.into(),
            status: None,
            outcome: None,
        }
    }

    /// Sets the status text.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Marks the report as final with the given outcome.
    #[must_use]
    pub const fn with_outcome(mut self, outcome: TaskOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    fn into_update(self) -> TaskUpdate {
        match self.outcome {
            Some(outcome) => TaskUpdate::Finish {
                outcome,
                status: self.status,
            },
            None => TaskUpdate::Progress {
                status: self.status,
            },
        }
    }
}

/// Stable classification of broker failures for transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed input or a duplicate identifier.
    Validation,
    /// The addressed task does not exist.
    NotFound,
    /// The task is not in a state, or not held by the worker, that allows
    /// the operation.
    Precondition,
    /// The broker itself is unusable.
    Internal,
}

/// Service-level errors for broker operations.
#[derive(Debug, Error)]
pub enum TaskBrokerError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

impl TaskBrokerError {
    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Domain(err) | Self::Store(TaskStoreError::Domain(err)) => domain_kind(err),
            Self::Store(TaskStoreError::DuplicateTask(_)) => FailureKind::Validation,
            Self::Store(TaskStoreError::NotFound(_)) => FailureKind::NotFound,
            Self::Store(TaskStoreError::LockPoisoned) => FailureKind::Internal,
        }
    }
}

const fn domain_kind(err: &TaskDomainError) -> FailureKind {
    match err {
        TaskDomainError::EmptyTaskId
        | TaskDomainError::EmptyWorkerId
        | TaskDomainError::EmptyPoolName
        | TaskDomainError::EmptySticker
        | TaskDomainError::InvalidTimestamps(_) => FailureKind::Validation,
        TaskDomainError::NotAcquired(_)
        | TaskDomainError::AlreadyTerminal { .. }
        | TaskDomainError::WorkerMismatch(_)
        | TaskDomainError::InvalidStateTransition { .. } => FailureKind::Precondition,
    }
}

/// Result type for broker service operations.
pub type TaskBrokerResult<T> = Result<T, TaskBrokerError>;

/// Broker orchestration service.
pub struct TaskBrokerService<S>
where
    S: TaskStore,
{
    store: Arc<S>,
}

impl<S> Clone for TaskBrokerService<S>
where
    S: TaskStore,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TaskBrokerService<S>
where
    S: TaskStore,
{
    /// Creates a new broker service.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Queues one task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the identifier is already taken.
    pub async fn insert(&self, draft: TaskDraft) -> TaskBrokerResult<Task> {
        let task = self
            .store
            .insert(draft)
            .await
            .inspect_err(|err| warn!(error = %err, "insert rejected"))?;
        info!(
            task_id = %task.id(),
            pool = %task.pool(),
            priority = task.priority(),
            "task inserted"
        );
        Ok(task)
    }

    /// Queues several tasks atomically.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when any identifier is taken or repeated;
    /// no task is queued in that case.
    pub async fn insert_batch(&self, drafts: Vec<TaskDraft>) -> TaskBrokerResult<Vec<Task>> {
        let tasks = self
            .store
            .insert_batch(drafts)
            .await
            .inspect_err(|err| warn!(error = %err, "batch insert rejected"))?;
        info!(count = tasks.len(), "task batch inserted");
        Ok(tasks)
    }

    /// Returns the task `worker` should work on, if any.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the worker identity is blank or the
    /// store is unusable.
    pub async fn acquire(&self, worker: &str) -> TaskBrokerResult<Option<Task>> {
        let worker_id = WorkerId::new(worker)?;
        let acquired = self.store.acquire(&worker_id).await?;
        match &acquired {
            Some(task) => info!(task_id = %task.id(), worker = %worker_id, "task handed out"),
            None => info!(worker = %worker_id, "no task available"),
        }
        Ok(acquired)
    }

    /// Applies a progress or completion report.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the task does not exist, is not held
    /// by the worker, or is not active.
    pub async fn update(&self, request: UpdateTaskRequest) -> TaskBrokerResult<Task> {
        let task_id = TaskId::new(request.task_id.as_str())?;
        let worker = WorkerId::new(request.worker.as_str())?;
        let task = self
            .store
            .update(&task_id, &worker, request.into_update())
            .await
            .inspect_err(|err| {
                warn!(task_id = %task_id, worker = %worker, error = %err, "update rejected");
            })?;
        info!(task_id = %task_id, worker = %worker, state = %task.state(), "task updated");
        Ok(task)
    }

    /// Returns a held task to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the task does not exist, is not held
    /// by the worker, or is not active.
    pub async fn refuse(&self, task_id: &str, worker: &str) -> TaskBrokerResult<Task> {
        let id = TaskId::new(task_id)?;
        let worker_id = WorkerId::new(worker)?;
        let task = self
            .store
            .update(&id, &worker_id, TaskUpdate::Refuse)
            .await
            .inspect_err(|err| {
                warn!(task_id = %id, worker = %worker_id, error = %err, "refuse rejected");
            })?;
        info!(task_id = %id, worker = %worker_id, "task refused");
        Ok(task)
    }

    /// Removes a task in any state.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the task does not exist.
    pub async fn delete(&self, task_id: &str) -> TaskBrokerResult<Task> {
        let id = TaskId::new(task_id)?;
        let task = self
            .store
            .delete(&id)
            .await
            .inspect_err(|err| warn!(task_id = %id, error = %err, "delete rejected"))?;
        info!(task_id = %id, state = %task.state(), "task deleted");
        Ok(task)
    }

    /// Retrieves a task by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the identifier is blank or the task
    /// does not exist.
    pub async fn get(&self, task_id: &str) -> TaskBrokerResult<Task> {
        let id = TaskId::new(task_id)?;
        let found = self.store.find_by_id(&id).await?;
        found.ok_or_else(|| TaskStoreError::NotFound(id).into())
    }

    /// Lists tasks in any of `states`, grouped by state in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the store is unusable.
    pub async fn list_by_states(&self, states: &[TaskState]) -> TaskBrokerResult<Vec<Task>> {
        Ok(self.store.list_by_states(states).await?)
    }

    /// Lists tasks carrying `sticker`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the sticker is blank or the store is
    /// unusable.
    pub async fn list_by_sticker(&self, sticker: &str) -> TaskBrokerResult<Vec<Task>> {
        let tag = Sticker::new(sticker)?;
        Ok(self.store.list_by_sticker(&tag).await?)
    }

    /// Lists every task in dequeue order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the store is unusable.
    pub async fn list_queue_order(&self) -> TaskBrokerResult<Vec<Task>> {
        Ok(self.store.list_queue_order().await?)
    }

    /// Returns the number of live tasks per state.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBrokerError`] when the store is unusable.
    pub async fn counts_by_state(&self) -> TaskBrokerResult<StateCounts> {
        Ok(self.store.counts_by_state().await?)
    }
}
