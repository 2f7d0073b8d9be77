//! Errors - エラー型と分類
//!
//! 各層のエラーは thiserror の enum で表現し、`ErrorKind` で運用上の分類に寄せます。
//!
//! # 分類
//! - Validation: 投入内容が不正（ジョブは作られない）
//! - NotFound: 未知の id / artifact 未作成
//! - InvalidTransition: 状態遷移グラフに反する更新
//! - UnknownJobType: task body が未登録（dispatch 時に判明 → failed として記録）
//! - TaskExecution: task body の実行失敗（failed として記録）
//! - StoreUnavailable: ストア・キューに到達できない（リトライ対象）
//! - Conflict: 生成した id が既存レコードと衝突（ストアは正常、作成だけ失敗）

use serde::Serialize;
use thiserror::Error;

use super::ids::JobId;
use super::status::JobStatus;

/// Operational classification of every error the pipeline surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidTransition,
    UnknownJobType,
    TaskExecution,
    StoreUnavailable,
    Conflict,
}

impl ErrorKind {
    /// Only infrastructure failures are worth retrying.
    #[inline]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StoreUnavailable)
    }
}

/// A submission that cannot become a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("job_type must be a non-empty string")]
    EmptyJobType,

    #[error("params must be a JSON object, got {0}")]
    ParamsNotObject(&'static str),
}

/// Errors from the job record store and the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("no artifact stored for {0}")]
    ArtifactNotFound(JobId),

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job id already exists: {0}")]
    DuplicateId(JobId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::ArtifactNotFound(_) => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::DuplicateId(_) => ErrorKind::Conflict,
            Self::Unavailable(_) | Self::Corrupt { .. } => ErrorKind::StoreUnavailable,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Errors from the job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StoreUnavailable
    }
}

/// Errors from the external dataset collaborator.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset unavailable: {0}")]
    Unavailable(String),

    #[error("malformed dataset: {0}")]
    Malformed(String),
}

/// Errors raised by a task body.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("dataset: {0}")]
    Dataset(#[from] DatasetError),

    #[error("task failed: {0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TaskExecution
    }
}
