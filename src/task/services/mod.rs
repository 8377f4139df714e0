//! Application services for the task broker.

mod broker;

pub use broker::{
    FailureKind, TaskBrokerError, TaskBrokerResult, TaskBrokerService, UpdateTaskRequest,
};
