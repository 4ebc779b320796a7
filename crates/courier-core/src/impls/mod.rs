//! Impls - 開発用の port 実装
//!
//! # 含まれる実装
//! - **LoggingBackend**: 送信せずにログだけ出す PushBackend
//!
//! キューの実装は `crate::queue`（InMemoryQueue）にある。
//! 本番用のプロバイダクライアントや永続キューは埋め込み側で実装する。

pub mod logging_backend;

pub use self::logging_backend::LoggingBackend;
