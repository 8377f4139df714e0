//! HTTP transport for the broker.
//!
//! [`router`] exposes the task operations under `/v1/task/` plus public
//! `/health` and `/metrics` routes. Every other path, unknown ones included,
//! requires the configured auth token, and mutating routes are refused while
//! the [`DrainGate`] is closed.

pub mod auth;
pub mod drain;
pub mod error;
pub mod handlers;

pub use auth::AUTH_HEADER;
pub use drain::{DrainGate, InFlightGuard};
pub use error::ApiError;
pub use handlers::{METRICS_CONTENT_TYPE, NDJSON_CONTENT_TYPE};

use crate::task::{ports::TaskStore, services::TaskBrokerService};
use crate::telemetry::WorkerMetrics;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Optional router features.
#[derive(Clone, Default)]
pub struct ServerOptions {
    auth_token: Option<Arc<str>>,
    metrics: Option<PrometheusHandle>,
    worker_metrics: Arc<WorkerMetrics>,
}

impl ServerOptions {
    /// Creates options with authentication and metrics disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `token` in the auth header. `None` or a blank token disables
    /// authentication.
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<&str>) -> Self {
        self.auth_token = token
            .filter(|value| !value.trim().is_empty())
            .map(Arc::from);
        self
    }

    /// Serves `handle`'s exposition text on `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Accepts the custom series declared in `metrics` on task updates.
    #[must_use]
    pub fn with_worker_metrics(mut self, metrics: WorkerMetrics) -> Self {
        self.worker_metrics = Arc::new(metrics);
        self
    }
}

/// State shared by every handler.
pub struct AppState<S>
where
    S: TaskStore,
{
    broker: TaskBrokerService<S>,
    gate: Arc<DrainGate>,
    metrics: Option<PrometheusHandle>,
    worker_metrics: Arc<WorkerMetrics>,
}

impl<S> Clone for AppState<S>
where
    S: TaskStore,
{
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            gate: Arc::clone(&self.gate),
            metrics: self.metrics.clone(),
            worker_metrics: Arc::clone(&self.worker_metrics),
        }
    }
}

/// Builds the broker router.
#[must_use]
pub fn router<S>(
    broker: TaskBrokerService<S>,
    gate: Arc<DrainGate>,
    options: ServerOptions,
) -> Router
where
    S: TaskStore + 'static,
{
    let ServerOptions {
        auth_token,
        metrics,
        worker_metrics,
    } = options;
    let state = AppState {
        broker,
        gate: Arc::clone(&gate),
        metrics,
        worker_metrics,
    };

    let tasks = Router::new()
        .route("/v1/task/get/all", get(handlers::list_all::<S>))
        .route("/v1/task/get/active", get(handlers::list_active::<S>))
        .route("/v1/task/get/done", get(handlers::list_done::<S>))
        .route("/v1/task/get/error", get(handlers::list_failed::<S>))
        .route(
            "/v1/task/get/sticker/{sticker}",
            get(handlers::list_by_sticker::<S>),
        )
        .route("/v1/task/get/{id}", get(handlers::get_task::<S>))
        .route("/v1/task/insert", post(handlers::insert::<S>))
        .route("/v1/task/acquire", post(handlers::acquire::<S>))
        .route("/v1/task/update", post(handlers::update::<S>))
        .route("/v1/task/refuse", post(handlers::refuse::<S>))
        .route("/v1/task/delete", post(handlers::delete::<S>))
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(
            Arc::clone(&gate),
            drain::reject_while_closed,
        ))
        .layer(from_fn_with_state(auth_token, auth::require_token));

    Router::new()
        .route("/health", get(handlers::health::<S>))
        .route("/metrics", get(handlers::metrics::<S>))
        .merge(tasks)
        .layer(from_fn_with_state(gate, drain::track_in_flight))
        .with_state(state)
}
