//! Error types for task domain validation and parsing.

use super::{TaskId, TaskState};
use thiserror::Error;

/// Errors returned while constructing or transitioning domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task identifier is empty after trimming.
    #[error("task id must not be empty")]
    EmptyTaskId,

    /// The worker identity is empty after trimming.
    #[error("worker id must not be empty")]
    EmptyWorkerId,

    /// The pool name is empty after trimming.
    #[error("pool name must not be empty")]
    EmptyPoolName,

    /// The sticker is empty after trimming.
    #[error("sticker must not be empty")]
    EmptySticker,

    /// The task is still waiting in the queue and has no holder.
    #[error("task {0} has not been acquired")]
    NotAcquired(TaskId),

    /// The task already reached a terminal state.
    #[error("task {task_id} is already {state}")]
    AlreadyTerminal {
        /// Task that rejected the update.
        task_id: TaskId,
        /// Terminal state the task is in.
        state: TaskState,
    },

    /// The reporting worker does not hold the task.
    #[error("task {0} is held by another worker")]
    WorkerMismatch(TaskId),

    /// The requested state change is not part of the lifecycle.
    #[error("invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidStateTransition {
        /// Task that rejected the transition.
        task_id: TaskId,
        /// Current task state.
        from: TaskState,
        /// Requested target state.
        to: TaskState,
    },

    /// The record was last updated before it was added.
    #[error("task {0} has an update timestamp earlier than its insert timestamp")]
    InvalidTimestamps(TaskId),
}

/// Error returned while parsing task states from ordinals or names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task state: {0}")]
pub struct ParseTaskStateError(pub String);
