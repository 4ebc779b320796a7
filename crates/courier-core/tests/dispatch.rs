//! Worker and server lifecycle tests against the in-memory queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use ulid::Ulid;

use courier_core::app::{FeedbackBuffer, Worker, WorkerConfig};
use courier_core::domain::{
    DeliveryOutcome, JobId, PushJob, QueueError, RelayError, ServiceId, WorkerState,
};
use courier_core::ports::{PushBackend, Queue, QueueCounts, QueueFactory};
use courier_core::queue::{InMemoryQueue, InMemoryQueueFactory, RetryPolicy};
use courier_core::shutdown::ShutdownSignal;
use courier_core::{RelayConfig, ServerBuilder};

// ============================================================
// Helpers
// ============================================================

/// Returns scripted outcomes in order, then `Delivered`.
struct ScriptedBackend {
    id: ServiceId,
    outcomes: Mutex<VecDeque<DeliveryOutcome>>,
}

impl ScriptedBackend {
    fn new(id: &str, outcomes: impl IntoIterator<Item = DeliveryOutcome>) -> Arc<Self> {
        Arc::new(Self {
            id: ServiceId::new(id),
            outcomes: Mutex::new(outcomes.into_iter().collect()),
        })
    }
}

#[async_trait]
impl PushBackend for ScriptedBackend {
    fn id(&self) -> ServiceId {
        self.id.clone()
    }

    async fn send(&self, _token: &str, _payload: &[u8]) -> DeliveryOutcome {
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

/// Blocks every send until released.
struct GatedBackend {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl PushBackend for GatedBackend {
    fn id(&self) -> ServiceId {
        ServiceId::new("push")
    }

    async fn send(&self, _token: &str, _payload: &[u8]) -> DeliveryOutcome {
        self.started.notify_one();
        self.release.notified().await;
        DeliveryOutcome::Delivered
    }
}

/// Wraps a queue and records every ack and requeue.
struct RecordingQueue {
    inner: InMemoryQueue,
    acks: Mutex<Vec<JobId>>,
    requeues: Mutex<Vec<(u32, Duration)>>,
}

impl RecordingQueue {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryQueue::new(ServiceId::new("push")),
            acks: Mutex::new(Vec::new()),
            requeues: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Queue for RecordingQueue {
    async fn enqueue(&self, job: PushJob) -> Result<(), QueueError> {
        self.inner.enqueue(job).await
    }

    async fn dequeue(&self, shutdown: &ShutdownSignal) -> Result<PushJob, QueueError> {
        self.inner.dequeue(shutdown).await
    }

    async fn ack(&self, job: &PushJob) -> Result<(), QueueError> {
        self.inner.ack(job).await?;
        self.acks.lock().push(job.id);
        Ok(())
    }

    async fn requeue(&self, job: PushJob, delay: Duration) -> Result<(), QueueError> {
        self.requeues.lock().push((job.attempt, delay));
        self.inner.requeue(job, delay).await
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.inner.counts().await
    }
}

fn job(token: &str) -> PushJob {
    PushJob::new(
        JobId::from_ulid(Ulid::new()),
        ServiceId::new("push"),
        token,
        b"hello".to_vec(),
        Utc::now(),
    )
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(120), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn fast_storage_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.worker.storage_retry = RetryPolicy {
        base_delay: Duration::from_millis(1),
        multiplier: 2.0,
        max_delay: Duration::from_millis(10),
        max_attempts: 3,
    };
    config
}

// ============================================================
// Worker
// ============================================================

#[tokio::test(start_paused = true)]
async fn three_transient_failures_then_delivered() {
    let queue = RecordingQueue::new();
    let backend = ScriptedBackend::new(
        "push",
        [
            DeliveryOutcome::transient("timeout"),
            DeliveryOutcome::transient("timeout"),
            DeliveryOutcome::transient("timeout"),
        ],
    );
    let handle = Worker::new(
        Arc::clone(&queue) as Arc<dyn Queue>,
        backend,
        FeedbackBuffer::new(),
        WorkerConfig::default(),
    )
    .spawn();

    queue.enqueue(job("T1")).await.unwrap();
    wait_until(|| !queue.acks.lock().is_empty()).await;

    assert_eq!(queue.acks.lock().len(), 1);
    assert_eq!(
        *queue.requeues.lock(),
        vec![
            (1, Duration::from_secs(1)),
            (2, Duration::from_secs(2)),
            (3, Duration::from_secs(4)),
        ]
    );
    handle.shutdown_and_join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn default_budget_retries_five_times_before_dropping() {
    let queue = RecordingQueue::new();
    let backend = ScriptedBackend::new(
        "push",
        std::iter::repeat_with(|| DeliveryOutcome::transient("503")).take(7),
    );
    let handle = Worker::new(
        Arc::clone(&queue) as Arc<dyn Queue>,
        backend,
        FeedbackBuffer::new(),
        WorkerConfig::default(),
    )
    .spawn();

    queue.enqueue(job("T1")).await.unwrap();
    wait_until(|| !queue.acks.lock().is_empty()).await;

    assert_eq!(
        *queue.requeues.lock(),
        vec![
            (1, Duration::from_secs(1)),
            (2, Duration::from_secs(2)),
            (3, Duration::from_secs(4)),
            (4, Duration::from_secs(8)),
            (5, Duration::from_secs(16)),
        ]
    );
    assert_eq!(queue.acks.lock().len(), 1);
    handle.shutdown_and_join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_is_acked_without_retry() {
    let queue = RecordingQueue::new();
    let feedback = FeedbackBuffer::new();
    let backend = ScriptedBackend::new("push", [DeliveryOutcome::permanent("payload too large")]);
    let handle = Worker::new(
        Arc::clone(&queue) as Arc<dyn Queue>,
        backend,
        feedback.clone(),
        WorkerConfig::default(),
    )
    .spawn();

    queue.enqueue(job("T1")).await.unwrap();
    wait_until(|| !queue.acks.lock().is_empty()).await;

    assert!(queue.requeues.lock().is_empty());
    assert!(feedback.is_empty());
    handle.shutdown_and_join().await.unwrap();
}

#[tokio::test]
async fn every_job_is_eventually_acked() {
    let queue = RecordingQueue::new();
    let mut outcomes = Vec::new();
    for i in 0..20 {
        outcomes.push(match i % 4 {
            0 => DeliveryOutcome::transient("flaky"),
            1 => DeliveryOutcome::InvalidToken,
            2 => DeliveryOutcome::permanent("rejected"),
            _ => DeliveryOutcome::Delivered,
        });
    }
    let mut config = WorkerConfig::default();
    config.delivery_retry.base_delay = Duration::from_millis(1);
    let handle = Worker::new(
        Arc::clone(&queue) as Arc<dyn Queue>,
        ScriptedBackend::new("push", outcomes),
        FeedbackBuffer::new(),
        config,
    )
    .spawn();

    for i in 0..10 {
        queue.enqueue(job(&format!("T{i}"))).await.unwrap();
    }
    wait_until(|| queue.acks.lock().len() == 10).await;

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.acked, 10);
    assert_eq!(counts.ready + counts.scheduled + counts.in_flight, 0);
    handle.shutdown_and_join().await.unwrap();
}

// ============================================================
// Server lifecycle
// ============================================================

#[tokio::test]
async fn shutdown_completes_the_in_flight_job() {
    let factory = Arc::new(InMemoryQueueFactory::new());
    let server = Arc::new(
        ServerBuilder::new()
            .queue_factory(Arc::clone(&factory) as Arc<dyn QueueFactory>)
            .build()
            .unwrap(),
    );
    let backend = Arc::new(GatedBackend {
        started: Notify::new(),
        release: Notify::new(),
    });
    server
        .register_service(Arc::clone(&backend) as Arc<dyn PushBackend>)
        .await
        .unwrap();

    let queue = factory.queue(&ServiceId::new("push")).unwrap();
    queue.enqueue(job("T1")).await.unwrap();
    backend.started.notified().await;

    let stopping = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.shutdown(Duration::from_secs(5)).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());
    assert_eq!(
        server.worker_states(),
        vec![(ServiceId::new("push"), WorkerState::Draining)]
    );

    backend.release.notify_one();
    stopping.await.unwrap().unwrap();

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.acked, 1);
    assert_eq!(counts.in_flight, 0);
    assert_eq!(
        server.worker_states(),
        vec![(ServiceId::new("push"), WorkerState::Stopped)]
    );
}

#[tokio::test]
async fn shutdown_times_out_on_a_stuck_send() {
    let factory = Arc::new(InMemoryQueueFactory::new());
    let server = ServerBuilder::new()
        .queue_factory(Arc::clone(&factory) as Arc<dyn QueueFactory>)
        .build()
        .unwrap();
    let backend = Arc::new(GatedBackend {
        started: Notify::new(),
        release: Notify::new(),
    });
    server
        .register_service(Arc::clone(&backend) as Arc<dyn PushBackend>)
        .await
        .unwrap();

    let queue = factory.queue(&ServiceId::new("push")).unwrap();
    queue.enqueue(job("T1")).await.unwrap();
    backend.started.notified().await;

    let started = Instant::now();
    let err = server
        .shutdown(Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::ShutdownTimeout(ref service) if service.as_str() == "push"));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn storage_failure_is_fatal_for_one_service_only() {
    let factory = Arc::new(InMemoryQueueFactory::new());
    let server = ServerBuilder::new()
        .config(fast_storage_config())
        .queue_factory(Arc::clone(&factory) as Arc<dyn QueueFactory>)
        .build()
        .unwrap();
    for id in ["apns", "fcm"] {
        server
            .register_service(ScriptedBackend::new(id, []))
            .await
            .unwrap();
    }

    factory
        .queue(&ServiceId::new("apns"))
        .unwrap()
        .close()
        .await;
    wait_until(|| {
        server
            .worker_states()
            .contains(&(ServiceId::new("apns"), WorkerState::Failed))
    })
    .await;

    // fcm keeps delivering
    let fcm = factory.queue(&ServiceId::new("fcm")).unwrap();
    fcm.enqueue(job("T1")).await.unwrap();
    let fcm_for_wait = Arc::clone(&fcm);
    tokio::time::timeout(Duration::from_secs(5), async move {
        while fcm_for_wait.counts().await.unwrap().acked < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        server.worker_states(),
        vec![
            (ServiceId::new("apns"), WorkerState::Failed),
            (ServiceId::new("fcm"), WorkerState::Running),
        ]
    );

    let err = server.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::StorageExhausted { ref service, .. } if service.as_str() == "apns"
    ));
}
