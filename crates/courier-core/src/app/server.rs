//! Server - ワーカー群・フィードバック・HTTP ingress の統括
//!
//! # ライフサイクル
//! 1. `register_service()` でサービスごとに queue + worker を起動
//! 2. `router()` / `serve()` で ingress を開始（この時点で登録は締め切り）
//! 3. `shutdown()` で ingress を止め、全 worker を drain して待つ

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::feedback::FeedbackBuffer;
use super::worker::{Worker, WorkerHandle};
use crate::config::RelayConfig;
use crate::domain::{RelayError, ServiceId, WorkerState};
use crate::http::{self, AppState, ServiceRoute};
use crate::ports::{Clock, IdGenerator, PushBackend, Queue, QueueFactory};
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};

#[derive(Default)]
struct Services {
    routes: BTreeMap<ServiceId, ServiceRoute>,
    /// Ids whose queue is still being created.
    pending: BTreeSet<ServiceId>,
    workers: Vec<WorkerHandle>,
}

/// The relay. Share it behind an `Arc` to serve and shut down from different tasks.
pub struct Server {
    config: RelayConfig,
    queue_factory: Arc<dyn QueueFactory>,
    feedback: FeedbackBuffer,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    services: Mutex<Services>,

    /// Set once the router is built; no more services after that.
    sealed: AtomicBool,
    serving: AtomicBool,
    shutting_down: AtomicBool,

    /// Stops ingress.
    stop_ingress: ShutdownTrigger,
    /// Fired by `serve_on` once the listener has drained.
    ingress_stopped: ShutdownTrigger,
}

impl Server {
    pub(crate) fn new(
        config: RelayConfig,
        queue_factory: Arc<dyn QueueFactory>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let (stop_ingress, _) = shutdown::channel();
        let (ingress_stopped, _) = shutdown::channel();
        Self {
            config,
            queue_factory,
            feedback: FeedbackBuffer::new(),
            ids,
            clock,
            services: Mutex::new(Services::default()),
            sealed: AtomicBool::new(false),
            serving: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            stop_ingress,
            ingress_stopped,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn feedback(&self) -> &FeedbackBuffer {
        &self.feedback
    }

    /// Register a backend: create its queue and start its worker.
    ///
    /// # Errors
    /// - `DuplicateService` if a backend with the same id is already registered
    /// - `RegistrationClosed` once ingress has been built
    /// - `Registration` if the queue factory fails
    pub async fn register_service(&self, backend: Arc<dyn PushBackend>) -> Result<(), RelayError> {
        let service = backend.id();
        self.reserve(&service)?;

        info!(%service, "initializing service");
        let queue = match self.queue_factory.new_queue(&service).await {
            Ok(queue) => queue,
            Err(source) => {
                self.services.lock().pending.remove(&service);
                return Err(RelayError::Registration { service, source });
            }
        };

        if !self.install(&service, backend, queue) {
            // router が queue 作成中に作られた: 作った queue は使われない
            warn!(%service, "registration closed while creating queue");
            self.queue_factory.discard_queue(&service).await;
            return Err(RelayError::RegistrationClosed(service));
        }
        Ok(())
    }

    /// Release the reservation, then start the worker and publish the route
    /// unless ingress was built meanwhile.
    fn install(
        &self,
        service: &ServiceId,
        backend: Arc<dyn PushBackend>,
        queue: Arc<dyn Queue>,
    ) -> bool {
        let mut services = self.services.lock();
        services.pending.remove(service);
        if self.sealed.load(Ordering::Acquire) {
            return false;
        }

        let handle = Worker::new(
            Arc::clone(&queue),
            backend,
            self.feedback.clone(),
            self.config.worker.clone(),
        )
        .spawn();
        services.routes.insert(
            service.clone(),
            ServiceRoute {
                queue,
                state: handle.watch_state(),
            },
        );
        services.workers.push(handle);
        true
    }

    /// Claim `service` so a concurrent registration of the same id fails fast.
    fn reserve(&self, service: &ServiceId) -> Result<(), RelayError> {
        let mut services = self.services.lock();
        if self.sealed.load(Ordering::Acquire) {
            return Err(RelayError::RegistrationClosed(service.clone()));
        }
        if services.routes.contains_key(service) || services.pending.contains(service) {
            return Err(RelayError::DuplicateService(service.clone()));
        }
        services.pending.insert(service.clone());
        Ok(())
    }

    /// Registered services, in id order.
    pub fn services(&self) -> Vec<ServiceId> {
        self.services.lock().routes.keys().cloned().collect()
    }

    /// Current state of every worker, in service id order.
    pub fn worker_states(&self) -> Vec<(ServiceId, WorkerState)> {
        self.services
            .lock()
            .routes
            .iter()
            .map(|(service, route)| (service.clone(), *route.state.borrow()))
            .collect()
    }

    /// Build the ingress router. Closes registration.
    pub fn router(&self) -> Router {
        let services = self.services.lock();
        self.sealed.store(true, Ordering::Release);
        http::create_router(AppState {
            services: Arc::new(services.routes.clone()),
            feedback: self.feedback.clone(),
            ids: Arc::clone(&self.ids),
            clock: Arc::clone(&self.clock),
            stopping: self.stop_ingress.signal(),
        })
    }

    /// Bind `config.listen_addr` and serve until `shutdown()`.
    pub async fn serve(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until `shutdown()`.
    ///
    /// Returns `Ok` when stopped by `shutdown()`; any other listener failure
    /// is `RelayError::Listener`.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<(), RelayError> {
        if self.serving.swap(true, Ordering::AcqRel) {
            return Err(RelayError::AlreadyServing);
        }

        let addr = listener.local_addr()?;
        let router = self.router();
        let stop = self.stop_ingress.signal();
        info!(%addr, services = ?self.services(), "courier server started");

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await;
        self.ingress_stopped.trigger();

        match result {
            Ok(()) => {
                info!("courier server stopped");
                Ok(())
            }
            Err(_) if self.shutting_down.load(Ordering::Acquire) => Ok(()),
            Err(err) => {
                error!(error = %err, "listener failed");
                Err(RelayError::Listener(err))
            }
        }
    }

    /// A signal that fires once `shutdown()` has been called.
    pub fn stopping(&self) -> ShutdownSignal {
        self.stop_ingress.signal()
    }

    /// Stop ingress, drain every worker and wait for them, bounded by `timeout`.
    ///
    /// Waits for all workers even after one fails and returns the first error.
    /// Later calls return `Ok` immediately.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RelayError> {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;

        info!(timeout_ms = timeout.as_millis() as u64, "shutting down");
        self.stop_ingress.trigger();
        if self.serving.load(Ordering::Acquire) {
            let stopped = self.ingress_stopped.signal();
            if tokio::time::timeout_at(deadline, stopped.cancelled())
                .await
                .is_err()
            {
                warn!("ingress did not stop before the deadline");
            }
        }

        let workers = std::mem::take(&mut self.services.lock().workers);
        for worker in &workers {
            worker.request_shutdown();
        }

        let mut first_error = None;
        for worker in workers {
            let service = worker.service().clone();
            match worker.join_until(deadline).await {
                Ok(()) => {}
                Err(err) => {
                    error!(%service, error = %err, "worker did not shut down cleanly");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!("all workers stopped");
                Ok(())
            }
        }
    }
}
