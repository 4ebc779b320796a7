//! App - アプリケーション層
//!
//! ports を組み合わせてリレー本体を組み立てる。
//!
//! # 主要コンポーネント
//! - **ServerBuilder**: Server の構築とワイヤリング
//! - **Server**: サービス登録、HTTP ingress、シャットダウン
//! - **Worker**: サービスごとの配送ループ（dequeue→send→decide→ack/requeue）
//! - **FeedbackBuffer**: トークンフィードバックの蓄積と drain

pub mod builder;
pub mod feedback;
pub mod server;
pub mod worker;

pub use self::builder::ServerBuilder;
pub use self::feedback::FeedbackBuffer;
pub use self::server::Server;
pub use self::worker::{Worker, WorkerConfig, WorkerHandle};
