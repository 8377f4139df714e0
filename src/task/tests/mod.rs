//! Unit tests for the task broker.
//!
//! Tests are organised by layer: lifecycle rules, store indexing, the acquire
//! algorithm, snapshot persistence and service failure classification.

mod acquire_tests;
mod domain_tests;
mod support;
