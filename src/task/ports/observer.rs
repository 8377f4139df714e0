//! Commit notifications emitted by task stores.

use crate::task::domain::{Task, TaskState};

/// Mutation that produced a [`TaskEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEventKind {
    /// A producer inserted the task.
    Inserted,
    /// A worker claimed the task from the queue.
    Acquired,
    /// The holder reported progress or completion.
    Updated,
    /// The holder gave the task back to the queue.
    Refused,
    /// The task was removed.
    Deleted,
    /// The task was loaded from a snapshot.
    Restored,
}

impl TaskEventKind {
    /// Returns the lowercase event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Acquired => "acquired",
            Self::Updated => "updated",
            Self::Refused => "refused",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
        }
    }
}

/// A committed mutation together with the resulting task.
///
/// For [`TaskEventKind::Deleted`] the task is the record as it was removed.
/// Acquire, update and refuse events also carry the state the task left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    kind: TaskEventKind,
    task: Task,
    previous_state: Option<TaskState>,
}

impl TaskEvent {
    /// Creates an event for a task that entered or left the store.
    #[must_use]
    pub const fn new(kind: TaskEventKind, task: Task) -> Self {
        Self {
            kind,
            task,
            previous_state: None,
        }
    }

    /// Creates an event for a task that moved from `previous_state`.
    #[must_use]
    pub const fn transition(kind: TaskEventKind, previous_state: TaskState, task: Task) -> Self {
        Self {
            kind,
            task,
            previous_state: Some(previous_state),
        }
    }

    /// Returns the mutation kind.
    #[must_use]
    pub const fn kind(&self) -> TaskEventKind {
        self.kind
    }

    /// Returns the task after the mutation.
    #[must_use]
    pub const fn task(&self) -> &Task {
        &self.task
    }

    /// Returns the state before the mutation, for in-place transitions.
    #[must_use]
    pub const fn previous_state(&self) -> Option<TaskState> {
        self.previous_state
    }
}

/// Receives a notification after each successful store commit.
///
/// Observers run while the store still holds its write lock, so events
/// arrive in commit order. They must return quickly and must not call back
/// into the store that notifies them.
#[cfg_attr(test, mockall::automock)]
pub trait TaskObserver: Send + Sync {
    /// Called once per committed task mutation.
    fn task_committed(&self, event: &TaskEvent);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTaskObserver;

impl TaskObserver for NoopTaskObserver {
    fn task_committed(&self, _event: &TaskEvent) {}
}
