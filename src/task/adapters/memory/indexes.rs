//! Record set and secondary indexes kept in lockstep.

use crate::task::domain::{PoolName, Sticker, Task, TaskId, TaskState};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Dequeue ordering key: state, then priority, then age.
///
/// `seq` records insertion order so tasks added within the same millisecond
/// still leave the queue first-in first-out.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(super) struct QueueKey {
    state: TaskState,
    priority: i64,
    added: DateTime<Utc>,
    seq: u64,
    id: TaskId,
}

impl QueueKey {
    fn of(task: &Task, seq: u64) -> Self {
        Self {
            state: task.state(),
            priority: task.priority(),
            added: task.added(),
            seq,
            id: task.id().clone(),
        }
    }

    pub(super) const fn state(&self) -> TaskState {
        self.state
    }

    pub(super) const fn id(&self) -> &TaskId {
        &self.id
    }
}

#[derive(Debug, Clone)]
struct Record {
    task: Task,
    seq: u64,
}

/// Owns every task and every index over them.
///
/// Nothing outside this type can reach an index, so a record and its index
/// entries are always added, replaced and removed together.
#[derive(Debug, Default)]
pub(super) struct TaskIndexes {
    records: BTreeMap<TaskId, Record>,
    by_sticker: BTreeMap<Sticker, BTreeSet<TaskId>>,
    by_state: BTreeMap<TaskState, BTreeSet<TaskId>>,
    queue: BTreeSet<QueueKey>,
    pool_active: BTreeMap<PoolName, BTreeSet<TaskId>>,
    next_seq: u64,
}

fn add_entry<K: Ord>(index: &mut BTreeMap<K, BTreeSet<TaskId>>, key: K, id: &TaskId) {
    index.entry(key).or_default().insert(id.clone());
}

/// Removes an id from a keyed index, cleaning up the entry if empty.
fn remove_entry<K: Ord>(index: &mut BTreeMap<K, BTreeSet<TaskId>>, key: &K, id: &TaskId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

impl TaskIndexes {
    pub(super) fn len(&self) -> usize {
        self.records.len()
    }

    pub(super) fn contains(&self, id: &TaskId) -> bool {
        self.records.contains_key(id)
    }

    pub(super) fn get(&self, id: &TaskId) -> Option<&Task> {
        self.records.get(id).map(|record| &record.task)
    }

    /// Reserves the next insertion sequence number.
    pub(super) fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Adds a task that is not yet present.
    pub(super) fn insert(&mut self, task: Task, seq: u64) {
        self.index(&task, seq);
        self.records.insert(task.id().clone(), Record { task, seq });
    }

    /// Swaps in a new version of a present task, keeping its sequence number.
    ///
    /// Returns `false` when the task is not present.
    pub(super) fn replace(&mut self, task: Task) -> bool {
        let Some(previous) = self.records.remove(task.id()) else {
            return false;
        };
        self.unindex(&previous.task, previous.seq);
        self.insert(task, previous.seq);
        true
    }

    pub(super) fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let record = self.records.remove(id)?;
        self.unindex(&record.task, record.seq);
        Some(record.task)
    }

    fn index(&mut self, task: &Task, seq: u64) {
        let id = task.id();
        add_entry(&mut self.by_sticker, task.sticker().clone(), id);
        add_entry(&mut self.by_state, task.state(), id);
        self.queue.insert(QueueKey::of(task, seq));
        if task.state().is_active() {
            add_entry(&mut self.pool_active, task.pool().clone(), id);
        }
    }

    fn unindex(&mut self, task: &Task, seq: u64) {
        let id = task.id();
        remove_entry(&mut self.by_sticker, task.sticker(), id);
        remove_entry(&mut self.by_state, &task.state(), id);
        self.queue.remove(&QueueKey::of(task, seq));
        if task.state().is_active() {
            remove_entry(&mut self.pool_active, task.pool(), id);
        }
    }

    /// Tasks in `state`, ordered by id.
    pub(super) fn in_state(&self, state: TaskState) -> impl Iterator<Item = &Task> + '_ {
        self.by_state
            .get(&state)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
    }

    /// Tasks carrying `sticker`, ordered by id.
    pub(super) fn with_sticker<'a>(
        &'a self,
        sticker: &Sticker,
    ) -> impl Iterator<Item = &'a Task> + 'a {
        self.by_sticker
            .get(sticker)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
    }

    /// Queue keys in dequeue order.
    pub(super) fn queue(&self) -> impl Iterator<Item = &QueueKey> + '_ {
        self.queue.iter()
    }

    /// All tasks, ordered by id.
    pub(super) fn all(&self) -> impl Iterator<Item = &Task> + '_ {
        self.records.values().map(|record| &record.task)
    }

    /// Number of acquired or working tasks in `pool`.
    pub(super) fn active_in_pool(&self, pool: &PoolName) -> usize {
        self.pool_active.get(pool).map_or(0, BTreeSet::len)
    }

    pub(super) fn count_in_state(&self, state: TaskState) -> usize {
        self.by_state.get(&state).map_or(0, BTreeSet::len)
    }
}
