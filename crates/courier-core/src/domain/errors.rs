//! Errors - キューとリレー全体のエラー型

use thiserror::Error;

use super::ids::ServiceId;

/// Errors reported by a `Queue` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The backing store cannot be reached.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// `dequeue` was cancelled by shutdown before a job became visible.
    #[error("dequeue cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("service already registered: {0}")]
    DuplicateService(ServiceId),

    #[error("cannot register service {0}: ingress already started (restart to add services)")]
    RegistrationClosed(ServiceId),

    #[error("failed to create queue for service {service}: {source}")]
    Registration {
        service: ServiceId,
        #[source]
        source: QueueError,
    },

    #[error("service {service}: {operation} kept failing, giving up: {source}")]
    StorageExhausted {
        service: ServiceId,
        operation: &'static str,
        #[source]
        source: QueueError,
    },

    #[error("worker for service {service} panicked: {reason}")]
    WorkerPanicked { service: ServiceId, reason: String },

    #[error("worker for service {0} did not stop before the shutdown deadline")]
    ShutdownTimeout(ServiceId),

    #[error("server is already serving")]
    AlreadyServing,

    #[error("listener error: {0}")]
    Listener(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_exhausted_names_service_and_operation() {
        let err = RelayError::StorageExhausted {
            service: ServiceId::new("apns"),
            operation: "dequeue",
            source: QueueError::Unavailable("connection refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "service apns: dequeue kept failing, giving up: queue unavailable: connection refused"
        );
    }
}
