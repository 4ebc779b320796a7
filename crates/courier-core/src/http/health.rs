//! GET /api/health

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{AppState, method_not_allowed};
use crate::domain::{ServiceId, WorkerState};
use crate::ports::QueueCounts;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health).fallback(method_not_allowed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: ServiceId,
    pub state: WorkerState,
    /// `None` when the queue cannot report (e.g. the store is down).
    pub queue: Option<QueueCounts>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub services: Vec<ServiceHealth>,
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let mut services = Vec::with_capacity(state.services.len());
    for (service, route) in state.services.iter() {
        let worker_state = *route.state.borrow();
        services.push(ServiceHealth {
            service: service.clone(),
            state: worker_state,
            queue: route.queue.counts().await.ok(),
        });
    }

    let status = if services.iter().any(|s| s.state == WorkerState::Failed) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };

    Json(HealthReport { status, services })
}
