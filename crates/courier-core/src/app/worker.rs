//! Worker - サービスごとの配送ループ
//!
//! # フロー
//! 1. Queue::dequeue() でジョブを 1 件取る（shutdown で Cancelled）
//! 2. PushBackend::send() を send_timeout 付きで実行
//! 3. DeliveryDecider で Decision を決める
//! 4. feedback 記録 / ack / requeue を実行
//!
//! 取り出したジョブは shutdown 中でも必ず ack か requeue まで進める。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::feedback::FeedbackBuffer;
use crate::domain::{
    Decision, DeliveryDecider, DeliveryOutcome, PushJob, QueueError, RelayError, ServiceId,
    WorkerState,
};
use crate::ports::{PushBackend, Queue};
use crate::queue::RetryPolicy;
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};

/// Worker tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Backoff and attempt budget for transient delivery failures.
    pub delivery_retry: RetryPolicy,

    /// Backoff and bound for failed queue calls.
    pub storage_retry: RetryPolicy,

    /// Upper bound for one `PushBackend::send`.
    pub send_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            delivery_retry: RetryPolicy::delivery_default(),
            storage_retry: RetryPolicy::storage_default(),
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// One worker per registered service. Owns its queue and backend for life.
pub struct Worker {
    service: ServiceId,
    queue: Arc<dyn Queue>,
    backend: Arc<dyn PushBackend>,
    feedback: FeedbackBuffer,
    decider: DeliveryDecider,
    storage_retry: RetryPolicy,
    send_timeout: Duration,
    state: Arc<watch::Sender<WorkerState>>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn Queue>,
        backend: Arc<dyn PushBackend>,
        feedback: FeedbackBuffer,
        config: WorkerConfig,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Running);
        Self {
            service: backend.id(),
            queue,
            backend,
            feedback,
            decider: DeliveryDecider::new(config.delivery_retry),
            storage_retry: config.storage_retry,
            send_timeout: config.send_timeout,
            state: Arc::new(state),
        }
    }

    /// Start the dispatch loop on its own task.
    pub fn spawn(self) -> WorkerHandle {
        let (trigger, signal) = shutdown::channel();
        let service = self.service.clone();
        let state = Arc::clone(&self.state);
        let join = tokio::spawn(self.run(signal));
        WorkerHandle {
            service,
            trigger,
            state,
            join,
        }
    }

    async fn run(self, shutdown: ShutdownSignal) -> Result<(), RelayError> {
        info!(service = %self.service, "worker started");
        let result = self.dispatch_loop(&shutdown).await;
        match &result {
            Ok(()) => {
                self.state.send_replace(WorkerState::Stopped);
                info!(service = %self.service, "worker stopped");
            }
            Err(err) => {
                self.state.send_replace(WorkerState::Failed);
                error!(service = %self.service, error = %err, "worker failed");
            }
        }
        result
    }

    async fn dispatch_loop(&self, shutdown: &ShutdownSignal) -> Result<(), RelayError> {
        let mut dequeue_failures: u32 = 0;

        loop {
            // shutdown が来ていたら新しい dequeue はしない
            if shutdown.is_triggered() {
                return Ok(());
            }

            let job = match self.queue.dequeue(shutdown).await {
                Ok(job) => {
                    dequeue_failures = 0;
                    job
                }
                Err(QueueError::Cancelled) => return Ok(()),
                Err(err) => {
                    dequeue_failures += 1;
                    if self.storage_retry.is_exhausted(dequeue_failures) {
                        return Err(RelayError::StorageExhausted {
                            service: self.service.clone(),
                            operation: "dequeue",
                            source: err,
                        });
                    }
                    let delay = self.storage_retry.next_delay(dequeue_failures);
                    warn!(
                        service = %self.service,
                        error = %err,
                        attempt = dequeue_failures,
                        delay_ms = delay.as_millis() as u64,
                        "dequeue failed, backing off"
                    );
                    // ジョブを持っていないので待機中の shutdown は即座に受け付ける
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {},
                    }
                    continue;
                }
            };

            self.process(job).await?;
        }
    }

    /// Drive one dequeued job to ack or requeue.
    async fn process(&self, mut job: PushJob) -> Result<(), RelayError> {
        let outcome = self.send(&job).await;
        debug!(
            service = %self.service,
            job_id = %job.id,
            attempt = job.attempt,
            outcome = %outcome,
            "send finished"
        );

        match self.decider.decide(&job, &outcome) {
            Decision::Ack => self.ack(&job).await,
            Decision::AckWithFeedback(feedback) => {
                info!(
                    service = %self.service,
                    job_id = %job.id,
                    reason = ?feedback.reason,
                    "token feedback recorded"
                );
                self.feedback.record(feedback);
                self.ack(&job).await
            }
            Decision::Retry { attempt, delay } => {
                job.attempt = attempt;
                warn!(
                    service = %self.service,
                    job_id = %job.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    outcome = %outcome,
                    "delivery failed, requeueing"
                );
                self.requeue(job, delay).await
            }
            Decision::Drop { reason } => {
                warn!(
                    service = %self.service,
                    job_id = %job.id,
                    attempt = job.attempt,
                    %reason,
                    "dropping job"
                );
                self.ack(&job).await
            }
        }
    }

    async fn send(&self, job: &PushJob) -> DeliveryOutcome {
        match tokio::time::timeout(
            self.send_timeout,
            self.backend.send(&job.token, &job.payload),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::transient(format!(
                "send timed out after {}ms",
                self.send_timeout.as_millis()
            )),
        }
    }

    async fn ack(&self, job: &PushJob) -> Result<(), RelayError> {
        let queue = &self.queue;
        self.with_storage_retry("ack", move || queue.ack(job)).await
    }

    async fn requeue(&self, job: PushJob, delay: Duration) -> Result<(), RelayError> {
        let queue = &self.queue;
        self.with_storage_retry("requeue", move || queue.requeue(job.clone(), delay))
            .await
    }

    /// Retry a queue call for the in-flight job. Not interrupted by shutdown.
    async fn with_storage_retry<F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<(), RelayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), QueueError>>,
    {
        let mut failures: u32 = 0;
        loop {
            match op().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    failures += 1;
                    if self.storage_retry.is_exhausted(failures) {
                        return Err(RelayError::StorageExhausted {
                            service: self.service.clone(),
                            operation,
                            source: err,
                        });
                    }
                    let delay = self.storage_retry.next_delay(failures);
                    warn!(
                        service = %self.service,
                        operation,
                        error = %err,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "queue call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Handle to a spawned worker.
/// - `request_shutdown()` stops new dequeues; the in-flight job still completes.
/// - `join_until()` waits for the loop to exit, bounded by a deadline.
pub struct WorkerHandle {
    service: ServiceId,
    trigger: ShutdownTrigger,
    state: Arc<watch::Sender<WorkerState>>,
    join: JoinHandle<Result<(), RelayError>>,
}

impl WorkerHandle {
    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Subscribe to state changes (used by the health endpoint).
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// This does not cancel an in-flight send; it only prevents the next dequeue.
    pub fn request_shutdown(&self) {
        self.trigger.trigger();
        self.state.send_if_modified(|state| {
            if *state == WorkerState::Running {
                *state = WorkerState::Draining;
                true
            } else {
                false
            }
        });
    }

    /// Wait for the worker to exit. On timeout the task is left running.
    pub async fn join_until(mut self, deadline: Instant) -> Result<(), RelayError> {
        match tokio::time::timeout_at(deadline, &mut self.join).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RelayError::WorkerPanicked {
                service: self.service,
                reason: join_err.to_string(),
            }),
            Err(_) => Err(RelayError::ShutdownTimeout(self.service)),
        }
    }

    /// Request shutdown and wait without a deadline.
    pub async fn shutdown_and_join(self) -> Result<(), RelayError> {
        self.request_shutdown();
        match self.join.await {
            Ok(result) => result,
            Err(join_err) => Err(RelayError::WorkerPanicked {
                service: self.service,
                reason: join_err.to_string(),
            }),
        }
    }
}
