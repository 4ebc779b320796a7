//! HTTP ingress (axum).
//!
//! - `POST /api/push`     enqueue a job for a registered service
//! - `POST /api/feedback` drain the token feedback buffer
//! - `GET  /api/health`   per-service worker state and queue counters

pub mod error;
pub mod feedback;
pub mod health;
pub mod push;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::app::FeedbackBuffer;
use crate::domain::{ServiceId, WorkerState};
use crate::ports::{Clock, IdGenerator, Queue};
use crate::shutdown::ShutdownSignal;

pub use self::error::ApiError;

/// What ingress knows about one registered service.
#[derive(Clone)]
pub struct ServiceRoute {
    pub queue: Arc<dyn Queue>,
    pub state: watch::Receiver<WorkerState>,
}

/// State shared by every handler.
///
/// The service table is frozen when the router is built.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<BTreeMap<ServiceId, ServiceRoute>>,
    pub feedback: FeedbackBuffer,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    /// Fires when the server starts shutting down; new pushes get 503.
    pub stopping: ShutdownSignal,
}

/// Build the complete ingress router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(push::router())
        .merge(feedback::router())
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 405 with a plain-text body.
async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Invalid request method.")
}
