//! Custom series that workers report alongside task updates.
//!
//! Operators declare each series in configuration with its type and label
//! names. A worker's update may carry a `metrics` object keyed by series
//! name; undeclared names are ignored.

use metrics::{Label, counter, gauge};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

/// Prefix used when none is configured.
pub const DEFAULT_METRICS_PREFIX: &str = "quern";

/// Prometheus type of a custom series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomMetricKind {
    /// Value that can go up and down.
    Gauge,
    /// Monotonic counter.
    Count,
}

/// Declaration of one custom series.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomMetricSettings {
    /// Series type.
    #[serde(rename = "type")]
    pub kind: CustomMetricKind,
    /// Label names, in the order workers supply values.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// One series update sent by a worker.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkerMetricReport {
    /// Amount added to a counter.
    #[serde(default)]
    pub add: u64,
    /// Value a gauge is set to.
    #[serde(default)]
    pub set: Option<f64>,
    /// Raise a gauge by one.
    #[serde(default)]
    pub inc: bool,
    /// Lower a gauge by one.
    #[serde(default)]
    pub dec: bool,
    /// Label values, positionally matching the declared names.
    #[serde(default)]
    pub labels: Vec<Value>,
}

/// Rejection of a worker's metric report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerMetricError {
    /// The report carries a different number of labels than declared.
    #[error("metric '{metric}' expects {expected} labels, got {actual}")]
    LabelCountMismatch {
        /// Series name.
        metric: String,
        /// Declared label count.
        expected: usize,
        /// Supplied label count.
        actual: usize,
    },

    /// A label value is not a string, number or boolean.
    #[error("metric '{metric}' label {position} must be a string, number or boolean")]
    UnsupportedLabel {
        /// Series name.
        metric: String,
        /// Zero-based label position.
        position: usize,
    },
}

/// Validated series updates, ready to record.
#[derive(Debug, Clone, Default)]
pub struct MetricBatch {
    updates: Vec<PreparedUpdate>,
}

#[derive(Debug, Clone)]
struct PreparedUpdate {
    name: String,
    kind: CustomMetricKind,
    labels: Vec<Label>,
    report: WorkerMetricReport,
}

impl MetricBatch {
    /// Returns `true` when nothing would be recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Records every update with the current recorder.
    pub fn record(self) {
        for update in self.updates {
            match update.kind {
                CustomMetricKind::Count => {
                    if update.report.add > 0 {
                        counter!(update.name, update.labels).increment(update.report.add);
                    }
                }
                CustomMetricKind::Gauge => {
                    let series = gauge!(update.name, update.labels);
                    if let Some(value) = update.report.set {
                        series.set(value);
                    }
                    if update.report.inc {
                        series.increment(1.0);
                    }
                    if update.report.dec {
                        series.decrement(1.0);
                    }
                }
            }
        }
    }
}

/// Declared custom series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerMetrics {
    prefix: String,
    declared: BTreeMap<String, CustomMetricSettings>,
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_METRICS_PREFIX, HashMap::new())
    }
}

impl WorkerMetrics {
    /// Creates the registry of series declared in configuration.
    #[must_use]
    pub fn new<S: std::hash::BuildHasher>(
        prefix: &str,
        declared: HashMap<String, CustomMetricSettings, S>,
    ) -> Self {
        Self {
            prefix: prefix.trim().to_owned(),
            declared: declared.into_iter().collect(),
        }
    }

    fn series_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}_{name}", self.prefix)
        }
    }

    /// Checks `reports` against the declarations.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerMetricError`] when a declared series receives the
    /// wrong number of labels or an unusable label value. Nothing is
    /// recorded in that case.
    pub fn prepare(
        &self,
        reports: &BTreeMap<String, WorkerMetricReport>,
    ) -> Result<MetricBatch, WorkerMetricError> {
        let mut updates = Vec::with_capacity(reports.len());
        for (name, report) in reports {
            let Some(declared) = self.declared.get(name) else {
                debug!(metric = %name, "ignoring undeclared worker metric");
                continue;
            };
            if declared.labels.len() != report.labels.len() {
                return Err(WorkerMetricError::LabelCountMismatch {
                    metric: name.clone(),
                    expected: declared.labels.len(),
                    actual: report.labels.len(),
                });
            }
            let labels = declared
                .labels
                .iter()
                .zip(&report.labels)
                .enumerate()
                .map(|(position, (key, value))| {
                    label_value(value)
                        .map(|text| Label::new(key.clone(), text))
                        .ok_or_else(|| WorkerMetricError::UnsupportedLabel {
                            metric: name.clone(),
                            position,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            updates.push(PreparedUpdate {
                name: self.series_name(name),
                kind: declared.kind,
                labels,
                report: report.clone(),
            });
        }
        Ok(MetricBatch { updates })
    }
}

fn label_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
