//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemory***: 開発・テスト用（単一プロセス）
//! - **Fs***: ファイルシステムへの永続化（単一プロセス）
//! - **Redis***: 複数プロセスで共有（feature = "redis"）
//! - **Dataset**: 静的 / JSON ファイル / HTTP（feature = "http"）

pub mod dataset;
pub mod fs_store;
pub mod inmem_job_store;
pub mod inmem_queue;
pub mod inmem_result_store;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use self::dataset::{JsonFileDataset, StaticDataset};
#[cfg(feature = "http")]
pub use self::dataset::HttpDataset;
pub use self::fs_store::{FsJobStore, FsResultStore};
pub use self::inmem_job_store::InMemoryJobStore;
pub use self::inmem_queue::InMemoryJobQueue;
pub use self::inmem_result_store::InMemoryResultStore;
#[cfg(feature = "redis")]
pub use self::redis_store::{RedisBackend, RedisJobQueue, RedisJobStore, RedisResultStore};
