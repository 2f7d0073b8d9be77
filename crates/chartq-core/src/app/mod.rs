//! App - アプリケーション層
//!
//! ports を組み合わせてパイプラインを組み立てます。
//!
//! # 主要コンポーネント
//! - **Context**: JobStore / JobQueue / ResultStore のハンドル（open / close）
//! - **AppBuilder**: task の登録と起動時検証
//! - **Gateway**: 投入・状態参照・成果物取得
//! - **WorkerLoop / WorkerGroup**: dequeue → claim → execute → complete
//! - **Backoff**: ストア・キュー障害時のリトライ間隔

pub mod builder;
pub mod context;
pub mod gateway;
pub mod retry;
pub mod status;
pub mod worker_loop;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::context::{Context, ContextError};
pub use self::gateway::{Gateway, GatewayError};
pub use self::retry::Backoff;
pub use self::status::StatusCounts;
pub use self::worker_loop::{JobOutcome, WorkerGroup, WorkerLoop};
