//! Ports - 抽象化レイヤー
//!
//! 外部システム（キューのストレージ、push プロバイダ、時刻、ID 生成）への
//! インターフェース。実装は `queue` / `impls` か埋め込み側アプリケーションが提供する。

pub mod backend;
pub mod clock;
pub mod id_generator;
pub mod queue;

pub use self::backend::PushBackend;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::queue::{Queue, QueueCounts, QueueFactory};
