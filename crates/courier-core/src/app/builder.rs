//! ServerBuilder - Server の構築とワイヤリング
//!
//! 設定は build() 時に検証する（Fail-fast）。

use std::sync::Arc;

use super::server::Server;
use crate::config::RelayConfig;
use crate::domain::RelayError;
use crate::ports::{Clock, IdGenerator, QueueFactory, SystemClock, UlidGenerator};
use crate::queue::InMemoryQueueFactory;

/// ServerBuilder は Server を構築
///
/// # 使用例
/// ```ignore
/// let server = ServerBuilder::new()
///     .config(RelayConfig::from_env()?)
///     .queue_factory(Arc::new(InMemoryQueueFactory::new()))
///     .build()?;
/// server.register_service(Arc::new(LoggingBackend::new("push"))).await?;
/// ```
///
/// # デフォルト
/// - config: `RelayConfig::default()`
/// - queue_factory: `InMemoryQueueFactory`
/// - clock: `SystemClock`
/// - id_generator: 設定された clock を使う `UlidGenerator`
#[derive(Default)]
pub struct ServerBuilder {
    config: Option<RelayConfig>,
    queue_factory: Option<Arc<dyn QueueFactory>>,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn queue_factory(mut self, factory: Arc<dyn QueueFactory>) -> Self {
        self.queue_factory = Some(factory);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(ids);
        self
    }

    /// Server を生成
    ///
    /// # 検証
    /// - `RelayConfig::validate()` に失敗すれば `RelayError::Config`
    pub fn build(self) -> Result<Server, RelayError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self.id_generator.unwrap_or_else(|| {
            Arc::new(UlidGenerator::new(Arc::clone(&clock))) as Arc<dyn IdGenerator>
        });
        let queue_factory = self.queue_factory.unwrap_or_else(|| {
            Arc::new(InMemoryQueueFactory::new()) as Arc<dyn QueueFactory>
        });

        Ok(Server::new(config, queue_factory, clock, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::RetryPolicy;

    #[test]
    fn build_with_defaults() {
        let server = ServerBuilder::new().build().unwrap();
        assert_eq!(server.config(), &RelayConfig::default());
        assert!(server.services().is_empty());
    }

    #[test]
    fn build_rejects_zero_attempt_budget() {
        let mut config = RelayConfig::default();
        config.worker.delivery_retry = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::delivery_default()
        };

        let result = ServerBuilder::new().config(config).build();
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
