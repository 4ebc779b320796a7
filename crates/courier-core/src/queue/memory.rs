//! In-memory queue implementation.
//!
//! Not durable across restarts; intended for development, tests and
//! single-process deployments that accept losing queued jobs on exit.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{JobId, PushJob, QueueError, ServiceId};
use crate::ports::{Queue, QueueCounts, QueueFactory};
use crate::shutdown::ShutdownSignal;

/// Scheduled job entry for the retry heap.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first);
/// `seq` breaks ties so equal delays keep requeue order.
#[derive(Debug)]
struct ScheduledJob {
    visible_at: Instant,
    seq: u64,
    job: PushJob,
}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.visible_at == other.visible_at && self.seq == other.seq
    }
}

impl Eq for ScheduledJob {}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .visible_at
            .cmp(&self.visible_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct InMemoryQueueState {
    /// Visible jobs in arrival order.
    ready: VecDeque<PushJob>,

    /// Requeued jobs waiting out their delay.
    scheduled: BinaryHeap<ScheduledJob>,

    /// Dequeued but not yet acked or requeued.
    in_flight: HashMap<JobId, PushJob>,

    next_seq: u64,
    acked: u64,
    closed: bool,
}

impl InMemoryQueueState {
    fn ensure_open(&self, service: &ServiceId) -> Result<(), QueueError> {
        if self.closed {
            return Err(QueueError::Unavailable(format!("queue for {service} is closed")));
        }
        Ok(())
    }

    /// Move scheduled jobs whose delay has elapsed to the ready queue.
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.visible_at > now {
                break; // Heap is sorted, so we can stop
            }
            if let Some(entry) = self.scheduled.pop() {
                self.ready.push_back(entry.job);
            }
        }
    }

    fn counts(&self) -> QueueCounts {
        QueueCounts {
            ready: self.ready.len(),
            scheduled: self.scheduled.len(),
            in_flight: self.in_flight.len(),
            acked: self.acked,
        }
    }
}

/// In-memory queue for one service.
pub struct InMemoryQueue {
    service: ServiceId,
    state: Mutex<InMemoryQueueState>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new(service: ServiceId) -> Self {
        Self {
            service,
            state: Mutex::new(InMemoryQueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    /// Simulate losing the backing store: every later call fails with `Unavailable`.
    ///
    /// Wakes every waiting `dequeue` so it observes the closed store.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    /// Undo `close`.
    pub async fn reopen(&self) {
        self.state.lock().await.closed = false;
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, job: PushJob) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            state.ensure_open(&self.service)?;
            state.ready.push_back(job);
        }
        // Notify waiting worker outside the lock
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, shutdown: &ShutdownSignal) -> Result<PushJob, QueueError> {
        loop {
            if shutdown.is_triggered() {
                return Err(QueueError::Cancelled);
            }

            // 状態を見る前に登録する: enqueue / close の通知を取りこぼさない
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wake = {
                let mut state = self.state.lock().await;
                state.ensure_open(&self.service)?;
                state.promote_due(Instant::now());

                if let Some(job) = state.ready.pop_front() {
                    state.in_flight.insert(job.id, job.clone());
                    return Ok(job);
                }

                state.scheduled.peek().map(|entry| entry.visible_at)
            };

            // Wait for a push, the next scheduled job, or shutdown
            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => return Err(QueueError::Cancelled),
                        _ = &mut notified => {},
                        _ = tokio::time::sleep_until(wake_at) => {},
                    }
                }
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => return Err(QueueError::Cancelled),
                        _ = &mut notified => {},
                    }
                }
            }
        }
    }

    async fn ack(&self, job: &PushJob) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.ensure_open(&self.service)?;
        if state.in_flight.remove(&job.id).is_some() {
            state.acked += 1;
        }
        Ok(())
    }

    async fn requeue(&self, job: PushJob, delay: Duration) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            state.ensure_open(&self.service)?;
            state.in_flight.remove(&job.id);
            let seq = state.next_seq;
            state.next_seq += 1;
            debug!(
                service = %self.service,
                job_id = %job.id,
                attempt = job.attempt,
                delay_ms = delay.as_millis() as u64,
                "job requeued"
            );
            state.scheduled.push(ScheduledJob {
                visible_at: Instant::now() + delay,
                seq,
                job,
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let state = self.state.lock().await;
        state.ensure_open(&self.service)?;
        Ok(state.counts())
    }
}

/// Creates an `InMemoryQueue` per service and keeps a handle to each.
#[derive(Default)]
pub struct InMemoryQueueFactory {
    queues: parking_lot::Mutex<HashMap<ServiceId, Arc<InMemoryQueue>>>,
}

impl InMemoryQueueFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue created for `service`, if any.
    pub fn queue(&self, service: &ServiceId) -> Option<Arc<InMemoryQueue>> {
        self.queues.lock().get(service).cloned()
    }
}

#[async_trait]
impl QueueFactory for InMemoryQueueFactory {
    async fn new_queue(&self, service: &ServiceId) -> Result<Arc<dyn Queue>, QueueError> {
        let queue = Arc::new(InMemoryQueue::new(service.clone()));
        self.queues.lock().insert(service.clone(), Arc::clone(&queue));
        Ok(queue)
    }

    async fn discard_queue(&self, service: &ServiceId) {
        self.queues.lock().remove(service);
    }
}
