//! Push job: one message to deliver through one service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{JobId, ServiceId};

/// One addressed message, owned by its service's queue until a worker dequeues it.
///
/// `attempt` counts transient failures so far. The queue never touches it;
/// the worker bumps it before calling `requeue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushJob {
    pub id: JobId,
    pub service: ServiceId,
    pub token: String,
    pub payload: Vec<u8>,
    pub attempt: u32,
    pub submitted_at: DateTime<Utc>,
}

impl PushJob {
    pub fn new(
        id: JobId,
        service: ServiceId,
        token: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            service,
            token: token.into(),
            payload: payload.into(),
            attempt: 0,
            submitted_at,
        }
    }
}
