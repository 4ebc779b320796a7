//! Queue port - サービスごとの配送キュー
//!
//! 具体的なストレージ（in-memory / disk / Redis など）は factory の裏に隠す。
//! enqueue / dequeue / ack / requeue の組み合わせで at-least-once を保証する:
//! enqueue から ack までの間にジョブが失われることはないが、
//! dequeue と ack の間でプロセスが落ちれば再配送されうる。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{PushJob, QueueError, ServiceId};
use crate::shutdown::ShutdownSignal;

/// Per-service durable work queue.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Store a job. Must not block indefinitely; `Unavailable` if the store is unreachable.
    async fn enqueue(&self, job: PushJob) -> Result<(), QueueError>;

    /// Wait for one visible job, transferring ownership to the caller.
    ///
    /// Returns `QueueError::Cancelled` (and no job) once `shutdown` fires.
    async fn dequeue(&self, shutdown: &ShutdownSignal) -> Result<PushJob, QueueError>;

    /// Permanently remove a job. Idempotent.
    async fn ack(&self, job: &PushJob) -> Result<(), QueueError>;

    /// Give the job back; it becomes visible no earlier than `delay` from now.
    /// `job.attempt` is stored as given.
    async fn requeue(&self, job: PushJob, delay: Duration) -> Result<(), QueueError>;

    /// Observability hook.
    async fn counts(&self) -> Result<QueueCounts, QueueError>;
}

/// Creates one queue per registered service.
#[async_trait]
pub trait QueueFactory: Send + Sync {
    async fn new_queue(&self, service: &ServiceId) -> Result<Arc<dyn Queue>, QueueError>;

    /// Release a queue from `new_queue` that was never put into service.
    async fn discard_queue(&self, _service: &ServiceId) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Visible now.
    pub ready: usize,
    /// Waiting out a requeue delay.
    pub scheduled: usize,
    /// Dequeued, not yet acked or requeued.
    pub in_flight: usize,
    /// Acknowledged since the queue was created.
    pub acked: u64,
}
