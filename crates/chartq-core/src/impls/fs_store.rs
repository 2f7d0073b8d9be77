//! File-system backed stores.
//!
//! # 学習ポイント
//! - tmp ファイルに書いてから rename する atomic write（中途半端なファイルは読めない）
//! - 書き込みが成功するまでメモリ上の状態も更新しない
//!
//! # レイアウト
//! ```text
//! <dir>/jobs.json              ジョブレコードのスナップショット（挿入順の配列）
//! <dir>/jobs.lock              開いているプロセスの pid（排他ロック）
//! <dir>/results/<id>.<ext>     成果物本体
//! <dir>/results/<id>.meta.json media type（これが存在して初めて「保存済み」）
//! ```
//!
//! 単一プロセスでの永続化用。複数プロセスで共有する場合は Redis を使うこと。
//! 2 つ目のプロセスが同じディレクトリを開こうとすると `jobs.lock` で拒否します
//! （スナップショットの上書き合いを防ぐ）。

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::domain::{Artifact, Job, JobId, JobStatus, NewJob, StoreError};
use crate::impls::inmem_job_store::{JobTable, apply_transition};
use crate::ports::{Clock, IdGenerator, JobStore, ResultStore, SystemClock, UlidGenerator};

const JOBS_FILE: &str = "jobs.json";
const LOCK_FILE: &str = "jobs.lock";
const RESULTS_DIR: &str = "results";

/// Write `bytes` to `path` via a synced sibling tmp file and rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn closed(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} is closed"))
}

/// Exclusive claim on a data directory, released when dropped.
#[derive(Debug)]
struct DirLock {
    path: PathBuf,
}

impl DirLock {
    async fn acquire(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(LOCK_FILE);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Unavailable(format!(
                    "{} is held by another process (delete it if that process is gone)",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };
        file.write_all(std::process::id().to_string().as_bytes())
            .await?;
        Ok(Self { path })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "could not release lock");
        }
    }
}

fn corrupt(path: &Path, err: impl fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// In-memory copy of the snapshot plus the directory lock; `lock` is `None` once closed.
struct FsState {
    table: JobTable,
    lock: Option<DirLock>,
}

impl FsState {
    fn open_table(&self) -> Result<&JobTable, StoreError> {
        match self.lock {
            Some(_) => Ok(&self.table),
            None => Err(closed("job store")),
        }
    }
}

/// JobStore persisted as a JSON snapshot, with an in-memory copy for reads.
pub struct FsJobStore {
    path: PathBuf,
    state: RwLock<FsState>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for FsJobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsJobStore").field("path", &self.path).finish()
    }
}

impl FsJobStore {
    /// Open (or create) the store under `dir`, loading any existing snapshot.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(
            dir,
            Arc::new(UlidGenerator::new(SystemClock)),
            Arc::new(SystemClock),
        )
        .await
    }

    pub async fn open_with(
        dir: impl AsRef<Path>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let lock = DirLock::acquire(dir).await?;
        let path = dir.join(JOBS_FILE);

        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let jobs: Vec<Job> =
                    serde_json::from_slice(&bytes).map_err(|e| corrupt(&path, e))?;
                tracing::info!(path = %path.display(), jobs = jobs.len(), "loaded job snapshot");
                JobTable::from_jobs(jobs)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => JobTable::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            state: RwLock::new(FsState {
                table,
                lock: Some(lock),
            }),
            ids,
            clock,
        })
    }

    async fn persist(&self, table: &JobTable) -> Result<(), StoreError> {
        let jobs: Vec<&Job> = table.iter().collect();
        let bytes = serde_json::to_vec_pretty(&jobs).map_err(|e| corrupt(&self.path, e))?;
        write_atomic(&self.path, &bytes).await
    }

    /// Apply `change` to a copy, persist it, then publish it.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut JobTable) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state.write().await;
        let mut next = state.open_table()?.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        state.table = next;
        Ok(out)
    }
}

#[async_trait]
impl JobStore for FsJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let job = Job::submitted(self.ids.generate_job_id(), new_job, self.clock.now());
        self.commit(|table| table.insert_new(job.clone())).await?;
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.state
            .read()
            .await
            .open_table()?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<Job, StoreError> {
        let clock = self.clock.as_ref();
        self.commit(|table| apply_transition(table, id, status, None, clock))
            .await
    }

    async fn mark_failed(&self, id: JobId, reason: String) -> Result<Job, StoreError> {
        let clock = self.clock.as_ref();
        self.commit(|table| apply_transition(table, id, JobStatus::Failed, Some(reason), clock))
            .await
    }

    async fn list_ids(&self) -> Result<Vec<JobId>, StoreError> {
        Ok(self.state.read().await.open_table()?.ids())
    }

    /// Sync the snapshot to disk and release the directory lock.
    async fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.lock.is_none() {
            return Ok(());
        }
        match tokio::fs::File::open(&self.path).await {
            Ok(file) => file.sync_all().await?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        state.lock = None;
        tracing::info!(path = %self.path.display(), "job store closed");
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactMeta {
    media_type: String,
    file: String,
}

/// ResultStore writing one file per artifact.
#[derive(Debug, Clone)]
pub struct FsResultStore {
    dir: PathBuf,
    closed: Arc<AtomicBool>,
}

impl FsResultStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().join(RESULTS_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed("result store"));
        }
        Ok(())
    }

    fn meta_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.meta.json"))
    }
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn store_artifact(&self, id: JobId, artifact: Artifact) -> Result<(), StoreError> {
        self.ensure_open()?;
        let meta = ArtifactMeta {
            media_type: artifact.media_type().to_string(),
            file: format!("{id}.{}", artifact.extension()),
        };
        write_atomic(&self.dir.join(&meta.file), artifact.bytes()).await?;

        let meta_path = self.meta_path(id);
        let meta_bytes = serde_json::to_vec(&meta).map_err(|e| corrupt(&meta_path, e))?;
        write_atomic(&meta_path, &meta_bytes).await
    }

    async fn get_artifact(&self, id: JobId) -> Result<Artifact, StoreError> {
        self.ensure_open()?;
        let meta_path = self.meta_path(id);
        let meta_bytes = match tokio::fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ArtifactNotFound(id));
            }
            Err(err) => return Err(err.into()),
        };
        let meta: ArtifactMeta =
            serde_json::from_slice(&meta_bytes).map_err(|e| corrupt(&meta_path, e))?;

        let bytes = tokio::fs::read(self.dir.join(&meta.file)).await?;
        Ok(Artifact::new(meta.media_type, bytes))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
