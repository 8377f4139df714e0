//! Domain model for queued tasks.
//!
//! Tasks move through a small lifecycle (`New`, `Acquired`, `Working`, then
//! `Done` or `Error`). The rules for who may move a task and where it may go
//! live here, away from indexing and persistence concerns.

mod error;
mod ids;
mod pool;
mod task;

pub use error::{ParseTaskStateError, TaskDomainError};
pub use ids::{DEFAULT_LABEL, PoolName, Sticker, TaskId, WorkerId};
pub use pool::{DEFAULT_POOL_MAX_SIZE, PoolLimits};
pub(crate) use task::now_millis;
pub use task::{PersistedTaskData, Task, TaskDraft, TaskOutcome, TaskState, TaskUpdate};
