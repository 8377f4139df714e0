//! Store port: the atomic operation contract over the live task set.

use crate::task::domain::{
    Sticker, Task, TaskDomainError, TaskDraft, TaskId, TaskState, TaskUpdate, WorkerId,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Number of live tasks in each state.
pub type StateCounts = BTreeMap<TaskState, usize>;

/// Task store contract.
///
/// Every mutating call is atomic: it either commits completely, with all
/// secondary indexes updated, or leaves the store unchanged. Read calls see a
/// consistent view that never includes a partially applied mutation.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts one task in state [`TaskState::New`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the identifier is taken.
    async fn insert(&self, draft: TaskDraft) -> TaskStoreResult<Task>;

    /// Inserts several tasks as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when any identifier is taken
    /// or repeated inside the batch; nothing is inserted in that case.
    async fn insert_batch(&self, drafts: Vec<TaskDraft>) -> TaskStoreResult<Vec<Task>>;

    /// Returns the task `worker` should work on, if any.
    ///
    /// A worker already holding an active task gets that task back unchanged.
    /// Otherwise the first queued task, by priority then age, whose pool is
    /// below its cap is claimed. `Ok(None)` means nothing is available.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::LockPoisoned`] when the store is unusable.
    async fn acquire(&self, worker: &WorkerId) -> TaskStoreResult<Option<Task>>;

    /// Applies a report from the worker holding task `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist and
    /// [`TaskStoreError::Domain`] when the lifecycle rejects the update.
    async fn update(
        &self,
        id: &TaskId,
        worker: &WorkerId,
        update: TaskUpdate,
    ) -> TaskStoreResult<Task>;

    /// Removes a task in any state and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::NotFound`] when the task does not exist.
    async fn delete(&self, id: &TaskId) -> TaskStoreResult<Task>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_id(&self, id: &TaskId) -> TaskStoreResult<Option<Task>>;

    /// Returns all tasks in `state`, ordered by identifier.
    async fn list_by_state(&self, state: TaskState) -> TaskStoreResult<Vec<Task>>;

    /// Returns all tasks in any of `states`, grouped by state in the given
    /// order and by identifier within a state.
    ///
    /// The whole listing is read from one consistent view, so a task moving
    /// between two of the states appears exactly once.
    async fn list_by_states(&self, states: &[TaskState]) -> TaskStoreResult<Vec<Task>>;

    /// Returns all tasks carrying `sticker`, ordered by identifier.
    async fn list_by_sticker(&self, sticker: &Sticker) -> TaskStoreResult<Vec<Task>>;

    /// Returns every task in dequeue order: state, then priority, then age.
    async fn list_queue_order(&self) -> TaskStoreResult<Vec<Task>>;

    /// Returns a point-in-time copy of every task, ordered by identifier.
    async fn export(&self) -> TaskStoreResult<Vec<Task>>;

    /// Loads previously exported tasks.
    ///
    /// Active tasks are returned to the queue with their claim dropped. The
    /// whole set is rejected if any record collides with a live task or with
    /// another record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] on an identifier collision.
    async fn restore(&self, tasks: Vec<Task>) -> TaskStoreResult<usize>;

    /// Returns the number of live tasks.
    async fn len(&self) -> TaskStoreResult<usize>;

    /// Returns `true` when the store holds no tasks.
    async fn is_empty(&self) -> TaskStoreResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Returns the number of live tasks per state.
    async fn counts_by_state(&self) -> TaskStoreResult<StateCounts>;
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskStoreError {
    /// The lifecycle rejected the operation.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// A previous holder of the store lock panicked.
    #[error("task store lock poisoned")]
    LockPoisoned,
}
