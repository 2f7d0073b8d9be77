//! JobStore port - ジョブレコードの正本（source of truth）
//!
//! # 設計原則
//! - 成功した呼び出しは戻る前に永続化を終えている（中途半端な record は読めない）
//! - 状態遷移の検証は `Job::transition` に一本化
//! - 書き込みは「その id を dequeue したワーカー」だけが行う（single-writer）
//!
//! # 実装
//! - InMemoryJobStore（開発・テスト用）
//! - FsJobStore（単一プロセスでの永続化）
//! - RedisJobStore（feature = "redis"、複数プロセス共有）

use async_trait::async_trait;

use crate::domain::{Job, JobId, JobStatus, NewJob, StoreError};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new record in `submitted` under a freshly generated id.
    ///
    /// An id collision fails with `StoreError::DuplicateId`; the existing
    /// record is never overwritten.
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// Move a job along the status graph and return the updated record.
    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<Job, StoreError>;

    /// Transition to `failed`, recording why.
    async fn mark_failed(&self, id: JobId, reason: String) -> Result<Job, StoreError>;

    /// All known ids in insertion order (for display only).
    async fn list_ids(&self) -> Result<Vec<JobId>, StoreError>;

    /// Release backend resources at shutdown.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
