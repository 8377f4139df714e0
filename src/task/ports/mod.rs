//! Port contracts for the task broker.
//!
//! Ports define infrastructure-agnostic interfaces used by task services.

pub mod observer;
pub mod store;

#[cfg(test)]
pub use observer::MockTaskObserver;
pub use observer::{NoopTaskObserver, TaskEvent, TaskEventKind, TaskObserver};
pub use store::{StateCounts, TaskStore, TaskStoreError, TaskStoreResult};
