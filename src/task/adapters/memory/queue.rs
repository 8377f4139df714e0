//! Acquire selection: worker affinity, then a pool-gated queue walk.

use super::indexes::TaskIndexes;
use crate::task::domain::{PoolLimits, PoolName, TaskId, TaskState, WorkerId};
use std::collections::HashMap;

/// Outcome of choosing a task for a polling worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Selection {
    /// The worker already holds this active task.
    Held(TaskId),
    /// This queued task should be claimed for the worker.
    Fresh(TaskId),
    /// Nothing is available: the queue is empty or every pool is saturated.
    Empty,
}

/// Picks the task `worker` should receive without mutating anything.
pub(super) fn select(indexes: &TaskIndexes, worker: &WorkerId, limits: &PoolLimits) -> Selection {
    if let Some(id) = held_by(indexes, worker) {
        return Selection::Held(id);
    }
    next_admissible(indexes, limits).map_or(Selection::Empty, Selection::Fresh)
}

fn held_by(indexes: &TaskIndexes, worker: &WorkerId) -> Option<TaskId> {
    [TaskState::Acquired, TaskState::Working]
        .into_iter()
        .flat_map(|state| indexes.in_state(state))
        .find(|task| task.is_held_by(worker))
        .map(|task| task.id().clone())
}

/// Walks queued tasks by priority then age, skipping saturated pools.
///
/// Active counts are looked up once per pool per call.
fn next_admissible(indexes: &TaskIndexes, limits: &PoolLimits) -> Option<TaskId> {
    let mut active: HashMap<PoolName, usize> = HashMap::new();
    for key in indexes
        .queue()
        .take_while(|key| key.state() == TaskState::New)
    {
        let Some(task) = indexes.get(key.id()) else {
            continue;
        };
        let pool = task.pool();
        let count = *active
            .entry(pool.clone())
            .or_insert_with(|| indexes.active_in_pool(pool));
        if count < limits.max_for(pool) {
            return Some(key.id().clone());
        }
    }
    None
}
