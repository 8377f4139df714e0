//! Adapters for the task broker ports.
//!
//! # Available Adapters
//!
//! - [`memory::InMemoryTaskStore`]: the indexed, lock-guarded live task set
//!   and its acquire algorithm
//! - [`snapshot::SnapshotFile`]: full-store persistence to a single file,
//!   written atomically and restored all-or-nothing

pub mod memory;
pub mod snapshot;
