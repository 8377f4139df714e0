//! Task record, lifecycle state machine and producer/worker inputs.

use super::{ParseTaskStateError, PoolName, Sticker, TaskDomainError, TaskId, WorkerId};
use chrono::{DateTime, SubsecRound, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle state, encoded ordinally on the wire and in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TaskState {
    /// Waiting in the queue.
    New,
    /// Claimed by a worker that has not reported progress yet.
    Acquired,
    /// A worker reported progress.
    Working,
    /// Completed successfully.
    Done,
    /// Completed with a failure.
    Error,
}

impl TaskState {
    /// Every state in ordinal order.
    pub const ALL: [Self; 5] = [
        Self::New,
        Self::Acquired,
        Self::Working,
        Self::Done,
        Self::Error,
    ];

    /// Returns the ordinal encoding (`0..=4`).
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Acquired => 1,
            Self::Working => 2,
            Self::Done => 3,
            Self::Error => 4,
        }
    }

    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Acquired => "acquired",
            Self::Working => "working",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Returns `true` for states that count against pool admission.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Acquired | Self::Working)
    }

    /// Returns `true` for states that accept no further lifecycle changes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Returns whether the lifecycle permits moving from `self` to `target`.
    ///
    /// Progress may be reported repeatedly, so `Working -> Working` is
    /// allowed. A claimed task may be finished without reporting progress
    /// first.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::New, Self::Acquired)
                | (
                    Self::Acquired | Self::Working,
                    Self::New | Self::Working | Self::Done | Self::Error
                )
        )
    }
}

impl From<TaskState> for u8 {
    fn from(state: TaskState) -> Self {
        state.ordinal()
    }
}

impl TryFrom<u8> for TaskState {
    type Error = ParseTaskStateError;

    fn try_from(value: u8) -> Result<Self, ParseTaskStateError> {
        Self::ALL
            .into_iter()
            .find(|state| state.ordinal() == value)
            .ok_or_else(|| ParseTaskStateError(value.to_string()))
    }
}

impl TryFrom<&str> for TaskState {
    type Error = ParseTaskStateError;

    fn try_from(value: &str) -> Result<Self, ParseTaskStateError> {
        let normalized = value.trim().to_ascii_lowercase();
        if let Ok(ordinal) = normalized.parse::<u8>() {
            return Self::try_from(ordinal);
        }
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseTaskStateError(value.to_owned()))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a worker finished a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The work succeeded.
    Done,
    /// The work failed.
    Error,
}

impl From<TaskOutcome> for TaskState {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Done => Self::Done,
            TaskOutcome::Error => Self::Error,
        }
    }
}

/// A lifecycle change reported by the worker holding a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    /// Work is in progress; moves the task to [`TaskState::Working`].
    Progress {
        /// Replacement status text. `None` keeps the current status.
        status: Option<String>,
    },
    /// Work finished; moves the task to a terminal state.
    Finish {
        /// Terminal outcome.
        outcome: TaskOutcome,
        /// Replacement status text. `None` keeps the current status.
        status: Option<String>,
    },
    /// The worker gives the task back to the queue.
    Refuse,
}

impl TaskUpdate {
    /// Returns the state this update moves a task into.
    #[must_use]
    pub fn target_state(&self) -> TaskState {
        match self {
            Self::Progress { .. } => TaskState::Working,
            Self::Finish { outcome, .. } => (*outcome).into(),
            Self::Refuse => TaskState::New,
        }
    }
}

/// Producer-supplied fields for a task that has not been inserted yet.
///
/// Blank identifiers, stickers and pools are resolved at insert time: the
/// store generates an id and applies the `"default"` sticker and pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDraft {
    id: Option<String>,
    sticker: Option<String>,
    priority: i64,
    body: String,
    pool: Option<String>,
}

impl TaskDraft {
    /// Creates a draft carrying the given payload.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Sets an explicit task identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the sticker.
    #[must_use]
    pub fn with_sticker(mut self, sticker: impl Into<String>) -> Self {
        self.sticker = Some(sticker.into());
        self
    }

    /// Sets the priority; lower values are served first.
    #[must_use]
    pub const fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the pool.
    #[must_use]
    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Returns the explicit identifier, if one was supplied.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the payload.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns the priority.
    #[must_use]
    pub const fn priority(&self) -> i64 {
        self.priority
    }
}

/// A queued unit of work.
///
/// Deserialization goes through [`PersistedTaskData`] so decoded records are
/// validated like any other reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PersistedTaskData")]
pub struct Task {
    id: TaskId,
    sticker: Sticker,
    priority: i64,
    body: String,
    pool: PoolName,
    state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker: Option<WorkerId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    added: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    updated: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted sticker.
    pub sticker: Sticker,
    /// Persisted priority.
    pub priority: i64,
    /// Persisted payload.
    pub body: String,
    /// Persisted pool.
    pub pool: PoolName,
    /// Persisted lifecycle state.
    pub state: TaskState,
    /// Persisted status text.
    #[serde(default)]
    pub status: Option<String>,
    /// Persisted holder.
    #[serde(default)]
    pub worker: Option<WorkerId>,
    /// Persisted insert timestamp.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub added: DateTime<Utc>,
    /// Persisted latest mutation timestamp.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated: DateTime<Utc>,
}

impl TryFrom<PersistedTaskData> for Task {
    type Error = TaskDomainError;

    fn try_from(data: PersistedTaskData) -> Result<Self, TaskDomainError> {
        Self::from_persisted(data)
    }
}

/// Current time at the millisecond precision the wire format carries.
pub(crate) fn now_millis(clock: &impl Clock) -> DateTime<Utc> {
    clock.utc().trunc_subsecs(3)
}

fn resolve<T>(
    value: Option<String>,
    parse: impl FnOnce(String) -> Result<T, TaskDomainError>,
    fallback: impl FnOnce() -> T,
) -> Result<T, TaskDomainError> {
    match value {
        Some(raw) if !raw.trim().is_empty() => parse(raw),
        _ => Ok(fallback()),
    }
}

impl Task {
    /// Creates a new queued task from a producer draft.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError`] when an explicit identifier, sticker or
    /// pool fails validation.
    pub fn from_draft(draft: TaskDraft, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        let timestamp = now_millis(clock);
        Ok(Self {
            id: resolve(draft.id, TaskId::new, TaskId::generate)?,
            sticker: resolve(draft.sticker, Sticker::new, Sticker::default_sticker)?,
            priority: draft.priority,
            body: draft.body,
            pool: resolve(draft.pool, PoolName::new, PoolName::default_pool)?,
            state: TaskState::New,
            status: None,
            worker: None,
            added: timestamp,
            updated: timestamp,
        })
    }

    /// Reconstructs a task from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTaskId`] for a blank identifier and
    /// [`TaskDomainError::InvalidTimestamps`] when `updated` precedes `added`.
    pub fn from_persisted(data: PersistedTaskData) -> Result<Self, TaskDomainError> {
        if data.id.as_str().trim().is_empty() {
            return Err(TaskDomainError::EmptyTaskId);
        }
        if data.updated < data.added {
            return Err(TaskDomainError::InvalidTimestamps(data.id));
        }
        Ok(Self {
            id: data.id,
            sticker: data.sticker,
            priority: data.priority,
            body: data.body,
            pool: data.pool,
            state: data.state,
            status: data.status,
            worker: data.worker,
            added: data.added,
            updated: data.updated,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// Returns the sticker.
    #[must_use]
    pub const fn sticker(&self) -> &Sticker {
        &self.sticker
    }

    /// Returns the priority.
    #[must_use]
    pub const fn priority(&self) -> i64 {
        self.priority
    }

    /// Returns the opaque payload.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns the pool.
    #[must_use]
    pub const fn pool(&self) -> &PoolName {
        &self.pool
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Returns the worker-supplied status text, if any.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Returns the worker holding or last holding the task.
    #[must_use]
    pub const fn worker(&self) -> Option<&WorkerId> {
        self.worker.as_ref()
    }

    /// Returns the insert timestamp.
    #[must_use]
    pub const fn added(&self) -> DateTime<Utc> {
        self.added
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// Returns `true` when the task is held by `worker` and still active.
    #[must_use]
    pub fn is_held_by(&self, worker: &WorkerId) -> bool {
        self.state.is_active() && self.worker.as_ref() == Some(worker)
    }

    /// Claims a queued task for `worker`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when the task is
    /// not [`TaskState::New`].
    pub fn acquire(&mut self, worker: WorkerId, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition_to(TaskState::Acquired)?;
        self.worker = Some(worker);
        self.touch(clock);
        Ok(())
    }

    /// Applies a worker report.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NotAcquired`] for queued tasks,
    /// [`TaskDomainError::AlreadyTerminal`] for finished tasks, and
    /// [`TaskDomainError::WorkerMismatch`] when `worker` does not hold the
    /// task.
    pub fn apply_update(
        &mut self,
        worker: &WorkerId,
        update: TaskUpdate,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.ensure_held_by(worker)?;
        self.transition_to(update.target_state())?;
        match update {
            TaskUpdate::Progress { status } | TaskUpdate::Finish { status, .. } => {
                if status.is_some() {
                    self.status = status;
                }
            }
            TaskUpdate::Refuse => {
                self.worker = None;
                self.status = None;
            }
        }
        self.touch(clock);
        Ok(())
    }

    /// Returns the task to the queue after a restart, dropping any claim.
    pub fn reset_for_restore(&mut self) {
        if self.state.is_active() {
            self.state = TaskState::New;
            self.worker = None;
            self.status = None;
            self.updated = self.added;
        }
    }

    fn ensure_held_by(&self, worker: &WorkerId) -> Result<(), TaskDomainError> {
        match self.state {
            TaskState::New => Err(TaskDomainError::NotAcquired(self.id.clone())),
            state if state.is_terminal() => Err(TaskDomainError::AlreadyTerminal {
                task_id: self.id.clone(),
                state,
            }),
            _ if self.worker.as_ref() != Some(worker) => {
                Err(TaskDomainError::WorkerMismatch(self.id.clone()))
            }
            _ => Ok(()),
        }
    }

    fn transition_to(&mut self, target: TaskState) -> Result<(), TaskDomainError> {
        if !self.state.can_transition_to(target) {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id.clone(),
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }

    /// Updates the `updated` timestamp, never moving it before `added`.
    fn touch(&mut self, clock: &impl Clock) {
        self.updated = now_millis(clock).max(self.added);
    }
}
