//! PushBackend port - プロバイダごとの送信クライアント
//!
//! ワイヤプロトコル（APNs / FCM / Web Push など）は実装側の責務。
//! コアは `send` の結果（DeliveryOutcome）だけを見る。

use async_trait::async_trait;

use crate::domain::{DeliveryOutcome, ServiceId};

/// One push provider integration.
///
/// `send` reports failures through the outcome, never through a panic or a
/// hang: the worker bounds every call with its send timeout and treats an
/// elapsed timeout as `TransientFailure`.
#[async_trait]
pub trait PushBackend: Send + Sync {
    /// Stable service identifier; also the name of the service's queue.
    fn id(&self) -> ServiceId;

    async fn send(&self, token: &str, payload: &[u8]) -> DeliveryOutcome;
}
