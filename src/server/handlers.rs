//! Route handlers translating JSON requests into broker calls.

use super::{AppState, error::ApiError};
use crate::task::{
    domain::{Task, TaskDraft, TaskId, TaskOutcome, TaskState},
    ports::TaskStore,
    services::UpdateTaskRequest,
};
use crate::telemetry::WorkerMetricReport;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Media type of task listings.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Media type of the Prometheus text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Deserialize)]
struct AcquireBody {
    worker: String,
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    id: String,
    worker: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    metrics: BTreeMap<String, WorkerMetricReport>,
}

impl UpdateBody {
    // `error` wins when both flags are set.
    const fn outcome(&self) -> Option<TaskOutcome> {
        if self.error {
            Some(TaskOutcome::Error)
        } else if self.done {
            Some(TaskOutcome::Done)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefuseBody {
    id: String,
    worker: String,
}

#[derive(Debug, Deserialize)]
struct DeleteBody {
    id: String,
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("can't parse request body: {err}")))
}

fn ndjson(tasks: &[Task]) -> Result<Response, ApiError> {
    let mut lines = String::new();
    for task in tasks {
        lines.push_str(&serde_json::to_string(task).map_err(ApiError::internal)?);
        lines.push('\n');
    }
    Ok(([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], lines).into_response())
}

fn ok_with_task(task: &Task) -> Json<Value> {
    Json(json!({ "result": "ok", "task": task }))
}

/// Reports `ok`, or `safemode` while mutations are rejected.
#[expect(clippy::unused_async, reason = "axum handlers are async functions")]
pub async fn health<S: TaskStore + 'static>(State(state): State<AppState<S>>) -> Json<Value> {
    let result = if state.gate.is_accepting() {
        "ok"
    } else {
        "safemode"
    };
    Json(json!({ "result": result }))
}

/// Answers unknown routes.
#[expect(clippy::unused_async, reason = "axum handlers are async functions")]
pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "unknown route")
}

/// Renders the Prometheus exposition text.
///
/// # Errors
///
/// Returns [`ApiError`] with status 404 when metrics are disabled.
#[expect(clippy::unused_async, reason = "axum handlers are async functions")]
pub async fn metrics<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Response, ApiError> {
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "metrics are disabled"))?;
    Ok(([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], handle.render()).into_response())
}

/// Lists every task in dequeue order.
///
/// # Errors
///
/// Returns [`ApiError`] when the broker cannot read the store.
pub async fn list_all<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Response, ApiError> {
    ndjson(&state.broker.list_queue_order().await?)
}

async fn list_states<S: TaskStore + 'static>(
    state: &AppState<S>,
    states: &[TaskState],
) -> Result<Response, ApiError> {
    ndjson(&state.broker.list_by_states(states).await?)
}

/// Lists acquired and working tasks.
///
/// # Errors
///
/// Returns [`ApiError`] when the broker cannot read the store.
pub async fn list_active<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Response, ApiError> {
    list_states(&state, &[TaskState::Acquired, TaskState::Working]).await
}

/// Lists tasks finished successfully.
///
/// # Errors
///
/// Returns [`ApiError`] when the broker cannot read the store.
pub async fn list_done<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Response, ApiError> {
    list_states(&state, &[TaskState::Done]).await
}

/// Lists tasks finished with an error.
///
/// # Errors
///
/// Returns [`ApiError`] when the broker cannot read the store.
pub async fn list_failed<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Response, ApiError> {
    list_states(&state, &[TaskState::Error]).await
}

/// Lists tasks carrying a sticker.
///
/// # Errors
///
/// Returns [`ApiError`] when the sticker is blank or the store is unusable.
pub async fn list_by_sticker<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
    Path(sticker): Path<String>,
) -> Result<Response, ApiError> {
    ndjson(&state.broker.list_by_sticker(&sticker).await?)
}

/// Returns one task.
///
/// # Errors
///
/// Returns [`ApiError`] with status 404 when the task does not exist.
pub async fn get_task<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.broker.get(&id).await?))
}

/// Queues one task object or an array of them as one atomic batch.
///
/// # Errors
///
/// Returns [`ApiError`] when the body is malformed or an identifier is
/// already taken.
pub async fn insert<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = parse_body(&body)?;
    if payload.is_array() {
        let drafts: Vec<TaskDraft> = serde_json::from_value(payload)
            .map_err(|err| ApiError::bad_request(format!("invalid task in batch: {err}")))?;
        let tasks = state.broker.insert_batch(drafts).await?;
        let ids: Vec<&TaskId> = tasks.iter().map(Task::id).collect();
        Ok(Json(json!({ "result": "ok", "ids": ids })))
    } else {
        let draft: TaskDraft = serde_json::from_value(payload)
            .map_err(|err| ApiError::bad_request(format!("invalid task: {err}")))?;
        let task = state.broker.insert(draft).await?;
        Ok(Json(json!({ "result": "ok", "id": task.id() })))
    }
}

/// Hands the calling worker a task, or `null` when none is admissible.
///
/// # Errors
///
/// Returns [`ApiError`] when the worker identity is missing or blank.
pub async fn acquire<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: AcquireBody = parse_body(&body)?;
    let task = state.broker.acquire(&request.worker).await?;
    Ok(Json(json!({ "result": "ok", "task": task })))
}

/// Applies a progress or completion report and records the custom series
/// it carries.
///
/// # Errors
///
/// Returns [`ApiError`] when the task is unknown or not held by the worker,
/// or when a custom series has the wrong labels. A rejected report changes
/// neither the task nor any series.
pub async fn update<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let report: UpdateBody = parse_body(&body)?;
    let series = state
        .worker_metrics
        .prepare(&report.metrics)
        .map_err(ApiError::bad_request)?;
    let outcome = report.outcome();
    let mut request = UpdateTaskRequest::new(report.id, report.worker);
    if let Some(status) = report.status {
        request = request.with_status(status);
    }
    if let Some(finished) = outcome {
        request = request.with_outcome(finished);
    }
    let task = state.broker.update(request).await?;
    series.record();
    Ok(ok_with_task(&task))
}

/// Returns a held task to the queue.
///
/// # Errors
///
/// Returns [`ApiError`] when the task is unknown or not held by the worker.
pub async fn refuse<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: RefuseBody = parse_body(&body)?;
    let task = state.broker.refuse(&request.id, &request.worker).await?;
    Ok(ok_with_task(&task))
}

/// Removes a task in any state.
///
/// # Errors
///
/// Returns [`ApiError`] when the task is unknown.
pub async fn delete<S: TaskStore + 'static>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: DeleteBody = parse_body(&body)?;
    let task = state.broker.delete(&request.id).await?;
    Ok(ok_with_task(&task))
}
