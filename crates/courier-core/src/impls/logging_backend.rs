//! LoggingBackend - 開発用の push バックエンド
//!
//! 実際のプロバイダには送らず、tracing にログを出して `Delivered` を返す。

use async_trait::async_trait;
use tracing::info;

use crate::domain::{DeliveryOutcome, ServiceId};
use crate::ports::PushBackend;

pub struct LoggingBackend {
    id: ServiceId,
}

impl LoggingBackend {
    pub fn new(id: impl Into<ServiceId>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl PushBackend for LoggingBackend {
    fn id(&self) -> ServiceId {
        self.id.clone()
    }

    async fn send(&self, token: &str, payload: &[u8]) -> DeliveryOutcome {
        info!(
            target: "push",
            service = %self.id,
            %token,
            payload = %String::from_utf8_lossy(payload),
            "push notification (logged, not sent)"
        );
        DeliveryOutcome::Delivered
    }
}
