//! Relay configuration loaded from `COURIER_*` environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::app::WorkerConfig;
use crate::domain::RelayError;
use crate::queue::RetryPolicy;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8322";

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// HTTP ingress address.
    pub listen_addr: SocketAddr,

    /// Retry, storage and timeout settings shared by every worker.
    pub worker: WorkerConfig,

    /// Upper bound for `Server::shutdown` when driven by the CLI.
    pub shutdown_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8322)),
            worker: WorkerConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment (after `.env`, if any).
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Unset variables fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let delivery = RetryPolicy::delivery_default();
        let storage = RetryPolicy::storage_default();

        let listen_addr = parse_or(
            &lookup,
            "COURIER_LISTEN_ADDR",
            defaults.listen_addr,
        )?;
        let base_ms = parse_or(
            &lookup,
            "COURIER_RETRY_BASE_MS",
            delivery.base_delay.as_millis() as u64,
        )?;
        let max_delay_ms = parse_or(
            &lookup,
            "COURIER_RETRY_MAX_DELAY_MS",
            delivery.max_delay.as_millis() as u64,
        )?;
        let max_attempts = parse_or(
            &lookup,
            "COURIER_RETRY_MAX_ATTEMPTS",
            delivery.max_attempts,
        )?;
        let send_timeout_ms = parse_or(
            &lookup,
            "COURIER_SEND_TIMEOUT_MS",
            defaults.worker.send_timeout.as_millis() as u64,
        )?;
        let storage_attempts = parse_or(
            &lookup,
            "COURIER_STORAGE_RETRY_ATTEMPTS",
            storage.max_attempts,
        )?;
        let shutdown_secs = parse_or(
            &lookup,
            "COURIER_SHUTDOWN_TIMEOUT_SECS",
            defaults.shutdown_timeout.as_secs(),
        )?;

        let config = Self {
            listen_addr,
            worker: WorkerConfig {
                delivery_retry: RetryPolicy {
                    base_delay: Duration::from_millis(base_ms),
                    max_delay: Duration::from_millis(max_delay_ms),
                    max_attempts,
                    ..delivery
                },
                storage_retry: RetryPolicy {
                    max_attempts: storage_attempts,
                    ..storage
                },
                send_timeout: Duration::from_millis(send_timeout_ms),
            },
            shutdown_timeout: Duration::from_secs(shutdown_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no worker can run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.worker.delivery_retry.max_attempts == 0 {
            return Err(RelayError::Config(
                "COURIER_RETRY_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        if self.worker.storage_retry.max_attempts == 0 {
            return Err(RelayError::Config(
                "COURIER_STORAGE_RETRY_ATTEMPTS must be at least 1".into(),
            ));
        }
        if self.worker.delivery_retry.base_delay > self.worker.delivery_retry.max_delay {
            return Err(RelayError::Config(
                "COURIER_RETRY_BASE_MS must not exceed COURIER_RETRY_MAX_DELAY_MS".into(),
            ));
        }
        if self.worker.send_timeout.is_zero() {
            return Err(RelayError::Config(
                "COURIER_SEND_TIMEOUT_MS must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, RelayError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| RelayError::Config(format!("{key}={raw:?} is invalid: {err}"))),
    }
}
