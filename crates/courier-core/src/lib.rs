//! courier-core
//!
//! Dispatch engine for the courier push-notification relay.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, outcome, feedback, decision, state, errors）
//! - **ports**: 抽象化レイヤー（Queue, QueueFactory, PushBackend, Clock, IdGenerator）
//! - **queue**: RetryPolicy と in-memory Queue 実装
//! - **impls**: 開発用の実装（LoggingBackend）
//! - **app**: Worker, FeedbackBuffer, Server, ServerBuilder
//! - **http**: axum による HTTP ingress
//! - **config**: 環境変数からの設定読み込み
//! - **shutdown**: watch ベースのシャットダウンシグナル

pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod shutdown;

pub use app::{FeedbackBuffer, Server, ServerBuilder};
pub use config::RelayConfig;
pub use domain::{DeliveryOutcome, PushJob, RelayError, ServiceId, TokenFeedback};
