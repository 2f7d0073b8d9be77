//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（Redis, ファイルシステム, データ提供元など）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - JobStore が状態の正本
//! - JobQueue は job id だけを流す
//! - ResultStore は成果物の保存先

pub mod clock;
pub mod dataset;
pub mod id_generator;
pub mod job_queue;
pub mod job_store;
pub mod result_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dataset::DatasetSource;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_queue::JobQueue;
pub use self::job_store::JobStore;
pub use self::result_store::ResultStore;
