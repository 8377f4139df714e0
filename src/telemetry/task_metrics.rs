//! Prometheus series derived from store commits.
//!
//! Every series is named `<prefix>_<name>`. Counters carry the task's
//! `sticker`, `priority` and `pool`; `tasks_done` adds `error`, and the
//! `tasks_count` gauge adds `state`.

use super::TelemetryError;
use crate::task::domain::{Task, TaskState};
use crate::task::ports::{TaskEvent, TaskEventKind, TaskObserver};
use metrics::{Label, counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the process-wide Prometheus recorder and describes the task
/// series.
///
/// # Errors
///
/// Returns [`TelemetryError::Metrics`] when a recorder is already installed.
pub fn install_metrics_recorder(prefix: &str) -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
    MetricNames::new(prefix).describe();
    Ok(handle)
}

#[derive(Debug, Clone)]
struct MetricNames {
    count: String,
    inserted: String,
    acquired: String,
    updated: String,
    refused: String,
    deleted: String,
    done: String,
}

impl MetricNames {
    fn new(prefix: &str) -> Self {
        let name = |base: &str| {
            if prefix.trim().is_empty() {
                base.to_owned()
            } else {
                format!("{prefix}_{base}")
            }
        };
        Self {
            count: name("tasks_count"),
            inserted: name("tasks_inserted"),
            acquired: name("tasks_acquired"),
            updated: name("tasks_updated"),
            refused: name("tasks_refused"),
            deleted: name("tasks_deleted"),
            done: name("tasks_done"),
        }
    }

    fn describe(&self) {
        describe_gauge!(self.count.clone(), "Live tasks per state");
        describe_counter!(self.inserted.clone(), "Tasks queued by producers");
        describe_counter!(self.acquired.clone(), "Tasks handed to workers");
        describe_counter!(self.updated.clone(), "Progress reports accepted");
        describe_counter!(self.refused.clone(), "Tasks given back to the queue");
        describe_counter!(self.deleted.clone(), "Tasks removed");
        describe_counter!(self.done.clone(), "Tasks finished, by outcome");
    }
}

fn task_labels(task: &Task) -> Vec<Label> {
    vec![
        Label::new("sticker", task.sticker().as_str().to_owned()),
        Label::new("priority", task.priority().to_string()),
        Label::new("pool", task.pool().as_str().to_owned()),
    ]
}

fn count(name: &str, task: &Task) {
    counter!(name.to_owned(), task_labels(task)).increment(1);
}

fn state_labels(task: &Task, state: TaskState) -> Vec<Label> {
    let mut labels = task_labels(task);
    labels.push(Label::new("state", state.as_str()));
    labels
}

/// Observer that keeps the task counters and the per-state gauge.
///
/// A worker re-polling for the task it already holds commits nothing, so it
/// moves no series.
#[derive(Debug, Clone)]
pub struct MetricsTaskObserver {
    names: MetricNames,
}

impl MetricsTaskObserver {
    /// Creates an observer naming its series with `prefix`.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            names: MetricNames::new(prefix),
        }
    }

    fn shift(&self, task: &Task, from: Option<TaskState>, to: Option<TaskState>) {
        if from == to {
            return;
        }
        if let Some(state) = from {
            gauge!(self.names.count.clone(), state_labels(task, state)).decrement(1.0);
        }
        if let Some(state) = to {
            gauge!(self.names.count.clone(), state_labels(task, state)).increment(1.0);
        }
    }

    fn finish(&self, task: &Task) {
        let mut labels = task_labels(task);
        let failed = task.state() == TaskState::Error;
        labels.push(Label::new("error", if failed { "true" } else { "false" }));
        counter!(self.names.done.clone(), labels).increment(1);
    }
}

impl TaskObserver for MetricsTaskObserver {
    fn task_committed(&self, event: &TaskEvent) {
        let task = event.task();
        let current = Some(task.state());
        match event.kind() {
            TaskEventKind::Inserted => {
                count(&self.names.inserted, task);
                self.shift(task, None, current);
            }
            TaskEventKind::Restored => self.shift(task, None, current),
            TaskEventKind::Acquired => {
                count(&self.names.acquired, task);
                self.shift(task, event.previous_state(), current);
            }
            TaskEventKind::Updated => {
                if task.state().is_terminal() {
                    self.finish(task);
                } else {
                    count(&self.names.updated, task);
                }
                self.shift(task, event.previous_state(), current);
            }
            TaskEventKind::Refused => {
                count(&self.names.refused, task);
                self.shift(task, event.previous_state(), current);
            }
            TaskEventKind::Deleted => {
                count(&self.names.deleted, task);
                self.shift(task, current, None);
            }
        }
    }
}
