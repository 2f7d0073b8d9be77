//! Context - バックエンドへのハンドル一式
//!
//! プロセス起動時に `open` し、終了時に `close` します。
//! グローバルな接続は持たず、Gateway / WorkerLoop に明示的に渡します。

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::config::StorageConfig;
use crate::domain::{ErrorKind, QueueError, StoreError};
use crate::impls::{
    FsJobStore, FsResultStore, InMemoryJobQueue, InMemoryJobStore, InMemoryResultStore,
};
use crate::ports::{JobQueue, JobStore, ResultStore};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("the '{0}' backend was not compiled in (enable the '{0}' feature)")]
    FeatureDisabled(&'static str),
}

impl ContextError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(err) => err.kind(),
            Self::Queue(err) => err.kind(),
            Self::FeatureDisabled(_) => ErrorKind::StoreUnavailable,
        }
    }
}

#[derive(Clone)]
pub struct Context {
    pub jobs: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub results: Arc<dyn ResultStore>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            jobs,
            queue,
            results,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryJobQueue::new()),
            Arc::new(InMemoryResultStore::new()),
        )
    }

    /// Open the backends named by `config`.
    ///
    /// The file backend has no shared queue, so it pairs durable records with
    /// an in-process queue; ids left queued at exit are not redelivered. The
    /// data directory is locked for as long as the context stays open.
    pub async fn open(config: &StorageConfig) -> Result<Self, ContextError> {
        let context = match config {
            StorageConfig::Memory => Self::in_memory(),
            StorageConfig::Fs { dir } => Self::new(
                Arc::new(FsJobStore::open(dir).await?),
                Arc::new(InMemoryJobQueue::new()),
                Arc::new(FsResultStore::open(dir).await?),
            ),
            #[cfg(feature = "redis")]
            StorageConfig::Redis { url, prefix } => {
                use crate::impls::{RedisBackend, RedisJobQueue, RedisJobStore, RedisResultStore};

                let backend = RedisBackend::open(url, prefix)?;
                Self::new(
                    Arc::new(RedisJobStore::new(backend.clone())),
                    Arc::new(RedisJobQueue::new(backend.clone())),
                    Arc::new(RedisResultStore::new(backend)),
                )
            }
            #[cfg(not(feature = "redis"))]
            StorageConfig::Redis { .. } => return Err(ContextError::FeatureDisabled("redis")),
        };
        tracing::info!(storage = ?config, "backends opened");
        Ok(context)
    }

    /// Close every backend, reporting the first failure after trying all of them.
    pub async fn close(&self) -> Result<(), ContextError> {
        let jobs = self.jobs.close().await;
        let queue = self.queue.close().await;
        let results = self.results.close().await;
        tracing::info!("backends closed");

        jobs?;
        queue?;
        results?;
        Ok(())
    }
}
