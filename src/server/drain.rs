//! Admission gate for mutating requests and in-flight tracking.
//!
//! The gate starts closed: the broker answers reads but rejects mutations
//! until the snapshot has been restored. Closing it again at shutdown lets
//! the binary wait for in-flight requests before writing the final snapshot.

use super::error::ApiError;
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Tracks whether mutations are admitted and how many requests are running.
#[derive(Debug, Default)]
pub struct DrainGate {
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Marks one request as in flight until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    gate: Arc<DrainGate>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.gate.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.gate.idle.notify_waiters();
        }
    }
}

impl DrainGate {
    /// Creates a closed gate with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts admitting mutations.
    pub fn open(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// Stops admitting mutations. Requests already running are unaffected.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Returns `true` while mutations are admitted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Returns the number of requests currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Registers a running request.
    #[must_use]
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            gate: Arc::clone(self),
        }
    }

    /// Resolves once no request is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Counts every request against the gate for its whole lifetime.
pub async fn track_in_flight(
    State(gate): State<Arc<DrainGate>>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = gate.enter();
    next.run(request).await
}

/// Answers mutating requests with 503 while the gate is closed.
///
/// # Errors
///
/// Returns [`ApiError::unavailable`] for `POST` requests when the gate is
/// closed.
pub async fn reject_while_closed(
    State(gate): State<Arc<DrainGate>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::POST && !gate.is_accepting() {
        return Err(ApiError::unavailable());
    }
    Ok(next.run(request).await)
}
