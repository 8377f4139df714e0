//! Structured logging and metrics for the broker process.
//!
//! [`init`] installs a `tracing` subscriber once per process. The filter comes
//! from `RUST_LOG` when set, otherwise from configuration.
//! [`LoggingTaskObserver`] turns store commits into log events and
//! [`MetricsTaskObserver`] turns them into Prometheus series.

mod task_metrics;
mod worker_metrics;

pub use task_metrics::{MetricsTaskObserver, install_metrics_recorder};
pub use worker_metrics::{
    CustomMetricKind, CustomMetricSettings, DEFAULT_METRICS_PREFIX, MetricBatch,
    WorkerMetricError, WorkerMetricReport, WorkerMetrics,
};

use crate::task::ports::{TaskEvent, TaskEventKind, TaskObserver};
use serde::Deserialize;
use std::sync::{Arc, Once};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, prelude::*};

static INIT: Once = Once::new();

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable compact lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Error returned when the subscriber or metrics recorder cannot be installed.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directive is malformed.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// Directive that failed to parse.
        directive: String,
        /// Parser message.
        message: String,
    },

    /// Another global subscriber is already installed.
    #[error("failed to install log subscriber: {0}")]
    Install(String),

    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

fn build_env_filter(fallback: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(fallback).map_err(|err| TelemetryError::InvalidFilter {
            directive: fallback.to_owned(),
            message: err.to_string(),
        })
    })
}

/// Installs the global subscriber. Later calls are no-ops.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the fallback filter is malformed or a
/// different subscriber was installed by someone else.
pub fn init(format: LogFormat, fallback_filter: &str) -> Result<(), TelemetryError> {
    let mut outcome = Ok(());
    INIT.call_once(|| {
        outcome = build_env_filter(fallback_filter).and_then(|filter| {
            let installed = match format {
                LogFormat::Text => tracing_subscriber::registry()
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_target(true)
                            .compact()
                            .with_filter(filter),
                    )
                    .try_init(),
                LogFormat::Json => tracing_subscriber::registry()
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_target(true)
                            .json()
                            .with_filter(filter),
                    )
                    .try_init(),
            };
            installed.map_err(|err| TelemetryError::Install(err.to_string()))
        });
    });
    outcome
}

/// Observer that logs every committed task mutation.
///
/// Acquisitions, completions and deletions log at `info`; inserts, restores
/// and progress reports at `debug` to keep busy queues readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTaskObserver;

impl TaskObserver for LoggingTaskObserver {
    fn task_committed(&self, event: &TaskEvent) {
        let task = event.task();
        let kind = event.kind().as_str();
        match event.kind() {
            TaskEventKind::Inserted | TaskEventKind::Restored => debug!(
                event = kind,
                task_id = %task.id(),
                sticker = %task.sticker(),
                pool = %task.pool(),
                priority = task.priority(),
                state = %task.state(),
                "task committed"
            ),
            TaskEventKind::Updated if !task.state().is_terminal() => debug!(
                event = kind,
                task_id = %task.id(),
                sticker = %task.sticker(),
                pool = %task.pool(),
                priority = task.priority(),
                state = %task.state(),
                "task committed"
            ),
            _ => info!(
                event = kind,
                task_id = %task.id(),
                sticker = %task.sticker(),
                pool = %task.pool(),
                priority = task.priority(),
                state = %task.state(),
                "task committed"
            ),
        }
    }
}

/// Observer that forwards every event to each inner observer in turn.
#[derive(Clone, Default)]
pub struct FanOutObserver {
    observers: Vec<Arc<dyn TaskObserver>>,
}

impl FanOutObserver {
    /// Appends an observer.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl std::fmt::Debug for FanOutObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl TaskObserver for FanOutObserver {
    fn task_committed(&self, event: &TaskEvent) {
        for observer in &self.observers {
            observer.task_committed(event);
        }
    }
}
