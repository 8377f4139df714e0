//! Quern: a pull-based task queue broker.
//!
//! Producers queue opaque tasks; workers poll for the next admissible task,
//! report progress, and finish or refuse it. Tasks are ordered by priority
//! then insertion time, and each pool caps how many of its tasks may be held
//! at once. State lives in memory and survives restarts through a snapshot
//! file.
//!
//! # Architecture
//!
//! Quern follows hexagonal architecture principles:
//!
//! - **Domain**: Task lifecycle rules with no infrastructure dependencies
//! - **Ports**: The task store and commit observer traits
//! - **Adapters**: The in-memory store and the snapshot file
//!
//! # Modules
//!
//! - [`config`]: Layered broker settings
//! - [`server`]: HTTP transport and the drain gate
//! - [`task`]: Task model, storage and broker service
//! - [`telemetry`]: Structured logging and Prometheus metrics

pub mod config;
pub mod server;
pub mod task;
pub mod telemetry;
