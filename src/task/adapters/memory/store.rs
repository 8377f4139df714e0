//! Lock-guarded task store implementing [`TaskStore`].

use super::indexes::TaskIndexes;
use super::queue::{Selection, select};
use crate::task::{
    domain::{PoolLimits, Sticker, Task, TaskDraft, TaskId, TaskState, TaskUpdate, WorkerId},
    ports::{
        NoopTaskObserver, StateCounts, TaskEvent, TaskEventKind, TaskObserver, TaskStore,
        TaskStoreError, TaskStoreResult,
    },
};
use async_trait::async_trait;
use mockable::Clock;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Thread-safe in-memory task store.
pub struct InMemoryTaskStore<C>
where
    C: Clock + Send + Sync,
{
    state: Arc<RwLock<TaskIndexes>>,
    clock: Arc<C>,
    limits: Arc<PoolLimits>,
    observer: Arc<dyn TaskObserver>,
}

impl<C> InMemoryTaskStore<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty store enforcing `limits` at acquire time.
    #[must_use]
    pub fn new(clock: Arc<C>, limits: PoolLimits) -> Self {
        Self {
            state: Arc::new(RwLock::new(TaskIndexes::default())),
            clock,
            limits: Arc::new(limits),
            observer: Arc::new(NoopTaskObserver),
        }
    }

    /// Replaces the commit observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn read(&self) -> TaskStoreResult<RwLockReadGuard<'_, TaskIndexes>> {
        self.state.read().map_err(|_| TaskStoreError::LockPoisoned)
    }

    fn write(&self) -> TaskStoreResult<RwLockWriteGuard<'_, TaskIndexes>> {
        self.state.write().map_err(|_| TaskStoreError::LockPoisoned)
    }

    /// Callers hold the write guard so observers see commits in order.
    fn notify(&self, events: impl IntoIterator<Item = TaskEvent>) {
        for event in events {
            self.observer.task_committed(&event);
        }
    }

    fn collect<'a>(tasks: impl Iterator<Item = &'a Task>) -> Vec<Task> {
        tasks.cloned().collect()
    }
}

impl<C> Clone for InMemoryTaskStore<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
            limits: Arc::clone(&self.limits),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<C> fmt::Debug for InMemoryTaskStore<C>
where
    C: Clock + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTaskStore")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Builds tasks from drafts, rejecting ids that are taken or repeated.
fn prepare_batch(
    indexes: &TaskIndexes,
    drafts: Vec<TaskDraft>,
    clock: &impl Clock,
) -> TaskStoreResult<Vec<Task>> {
    let mut seen = HashSet::with_capacity(drafts.len());
    drafts
        .into_iter()
        .map(|draft| {
            let task = Task::from_draft(draft, clock)?;
            if indexes.contains(task.id()) || !seen.insert(task.id().clone()) {
                return Err(TaskStoreError::DuplicateTask(task.id().clone()));
            }
            Ok(task)
        })
        .collect()
}

#[async_trait]
impl<C> TaskStore for InMemoryTaskStore<C>
where
    C: Clock + Send + Sync,
{
    async fn insert(&self, draft: TaskDraft) -> TaskStoreResult<Task> {
        let mut state = self.write()?;
        let task = Task::from_draft(draft, &*self.clock)?;
        if state.contains(task.id()) {
            return Err(TaskStoreError::DuplicateTask(task.id().clone()));
        }
        let seq = state.next_seq();
        state.insert(task.clone(), seq);
        debug!(task_id = %task.id(), live = state.len(), "indexed inserted task");
        self.notify([TaskEvent::new(TaskEventKind::Inserted, task.clone())]);
        Ok(task)
    }

    async fn insert_batch(&self, drafts: Vec<TaskDraft>) -> TaskStoreResult<Vec<Task>> {
        let mut state = self.write()?;
        let tasks = prepare_batch(&state, drafts, &*self.clock)?;
        for task in &tasks {
            let seq = state.next_seq();
            state.insert(task.clone(), seq);
        }
        debug!(count = tasks.len(), live = state.len(), "indexed inserted tasks");
        self.notify(
            tasks
                .iter()
                .map(|task| TaskEvent::new(TaskEventKind::Inserted, task.clone())),
        );
        Ok(tasks)
    }

    async fn acquire(&self, worker: &WorkerId) -> TaskStoreResult<Option<Task>> {
        let mut state = self.write()?;
        match select(&state, worker, &self.limits) {
            Selection::Held(id) => {
                debug!(task_id = %id, worker = %worker, "worker already holds task");
                Ok(state.get(&id).cloned())
            }
            Selection::Empty => {
                debug!(worker = %worker, "no admissible task");
                Ok(None)
            }
            Selection::Fresh(id) => {
                let mut task = state
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| TaskStoreError::NotFound(id.clone()))?;
                let from = task.state();
                task.acquire(worker.clone(), &*self.clock)?;
                state.replace(task.clone());
                self.notify([TaskEvent::transition(
                    TaskEventKind::Acquired,
                    from,
                    task.clone(),
                )]);
                Ok(Some(task))
            }
        }
    }

    async fn update(
        &self,
        id: &TaskId,
        worker: &WorkerId,
        update: TaskUpdate,
    ) -> TaskStoreResult<Task> {
        let kind = match update {
            TaskUpdate::Refuse => TaskEventKind::Refused,
            TaskUpdate::Progress { .. } | TaskUpdate::Finish { .. } => TaskEventKind::Updated,
        };
        let mut state = self.write()?;
        let mut task = state
            .get(id)
            .cloned()
            .ok_or_else(|| TaskStoreError::NotFound(id.clone()))?;
        let from = task.state();
        task.apply_update(worker, update, &*self.clock)?;
        state.replace(task.clone());
        debug!(task_id = %id, state = %task.state(), "reindexed updated task");
        self.notify([TaskEvent::transition(kind, from, task.clone())]);
        Ok(task)
    }

    async fn delete(&self, id: &TaskId) -> TaskStoreResult<Task> {
        let mut state = self.write()?;
        let task = state
            .remove(id)
            .ok_or_else(|| TaskStoreError::NotFound(id.clone()))?;
        debug!(task_id = %id, live = state.len(), "unindexed deleted task");
        self.notify([TaskEvent::new(TaskEventKind::Deleted, task.clone())]);
        Ok(task)
    }

    async fn find_by_id(&self, id: &TaskId) -> TaskStoreResult<Option<Task>> {
        let state = self.read()?;
        Ok(state.get(id).cloned())
    }

    async fn list_by_state(&self, task_state: TaskState) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(Self::collect(state.in_state(task_state)))
    }

    async fn list_by_states(&self, states: &[TaskState]) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        let indexes: &TaskIndexes = &state;
        Ok(Self::collect(
            states
                .iter()
                .flat_map(|task_state| indexes.in_state(*task_state)),
        ))
    }

    async fn list_by_sticker(&self, sticker: &Sticker) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(Self::collect(state.with_sticker(sticker)))
    }

    async fn list_queue_order(&self) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(Self::collect(
            state.queue().filter_map(|key| state.get(key.id())),
        ))
    }

    async fn export(&self) -> TaskStoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(Self::collect(state.all()))
    }

    async fn restore(&self, tasks: Vec<Task>) -> TaskStoreResult<usize> {
        let mut state = self.write()?;
        let mut seen = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if state.contains(task.id()) || !seen.insert(task.id().clone()) {
                return Err(TaskStoreError::DuplicateTask(task.id().clone()));
            }
        }
        let mut ordered = tasks;
        for task in &mut ordered {
            task.reset_for_restore();
        }
        ordered.sort_by(|a, b| (a.added(), a.id()).cmp(&(b.added(), b.id())));
        for task in &ordered {
            let seq = state.next_seq();
            state.insert(task.clone(), seq);
        }
        debug!(count = ordered.len(), live = state.len(), "indexed restored tasks");
        let count = ordered.len();
        self.notify(
            ordered
                .into_iter()
                .map(|task| TaskEvent::new(TaskEventKind::Restored, task)),
        );
        Ok(count)
    }

    async fn len(&self) -> TaskStoreResult<usize> {
        Ok(self.read()?.len())
    }

    async fn counts_by_state(&self) -> TaskStoreResult<StateCounts> {
        let state = self.read()?;
        Ok(TaskState::ALL
            .into_iter()
            .map(|task_state| (task_state, state.count_in_state(task_state)))
            .collect())
    }
}
