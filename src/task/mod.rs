//! Pull-based task queue.
//!
//! Producers insert tasks, workers poll for them, report progress and mark
//! them finished. The module follows hexagonal architecture:
//!
//! - Domain types and lifecycle rules in [`domain`]
//! - Port contracts in [`ports`]
//! - The in-memory store and snapshot file in [`adapters`]
//! - Request validation and failure classification in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
