//! Redis-backed JobStore / JobQueue / ResultStore (feature = "redis").
//!
//! 複数プロセス（gateway とワーカー群）で状態を共有するための実装です。
//!
//! # キー設計
//! - `<prefix>:job:<id>`    ジョブレコード（JSON 文字列、作成は Lua で SET NX + RPUSH を一括実行）
//! - `<prefix>:jobs`        id の挿入順リスト（RPUSH）
//! - `<prefix>:queue`       配送キュー（RPUSH / BLPOP）
//! - `<prefix>:result:<id>` 成果物ハッシュ（`content_type`, `image`）
//!
//! # 実装
//! redis クレートの同期 API を `spawn_blocking` で包みます。
//! 接続は使い回し、`close` 後の呼び出しは再接続せずに `Unavailable` を返します。
//! BLPOP はキャンセルできないため、`dequeue_timeout` は途中で打ち切らないこと。

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Artifact, Job, JobId, JobStatus, NewJob, QueueError, StoreError};
use crate::ports::{Clock, IdGenerator, JobQueue, JobStore, ResultStore, SystemClock, UlidGenerator};

pub const DEFAULT_PREFIX: &str = "chartq";

/// Idle connections kept for reuse; extras are dropped.
const MAX_IDLE_CONNECTIONS: usize = 16;

const CLOSED: &str = "redis backend is closed";

/// Creates the record and appends it to the insertion-order list, or does nothing.
const CREATE_SCRIPT: &str = r"
if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
    redis.call('RPUSH', KEYS[2], ARGV[2])
    return 1
end
return 0
";

/// Client and idle connections shared by every store built from one backend.
///
/// `close` drops the client and the idle connections; calls made afterwards fail
/// with `Unavailable` instead of reconnecting.
struct Connections {
    client: Option<redis::Client>,
    idle: Vec<redis::Connection>,
}

/// Shared client plus key layout.
#[derive(Clone)]
pub struct RedisBackend {
    connections: Arc<Mutex<Connections>>,
    prefix: Arc<str>,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("prefix", &self.prefix)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RedisBackend {
    pub fn open(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("redis connect: {e}")))?;
        Ok(Self {
            connections: Arc::new(Mutex::new(Connections {
                client: Some(client),
                idle: Vec::new(),
            })),
            prefix: Arc::from(prefix),
        })
    }

    fn job_key(&self, id: JobId) -> String {
        format!("{}:job:{id}", self.prefix)
    }

    fn jobs_key(&self) -> String {
        format!("{}:jobs", self.prefix)
    }

    fn queue_key(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    fn result_key(&self, id: JobId) -> String {
        format!("{}:result:{id}", self.prefix)
    }

    fn lock(connections: &Mutex<Connections>) -> MutexGuard<'_, Connections> {
        connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_closed(&self) -> bool {
        Self::lock(&self.connections).client.is_none()
    }

    /// Drop the client and every idle connection. Idempotent.
    pub fn close(&self) {
        let mut connections = Self::lock(&self.connections);
        if connections.client.take().is_some() {
            tracing::info!(prefix = %self.prefix, "redis backend closed");
        }
        connections.idle.clear();
    }

    /// Run a blocking command off the async runtime, reusing an idle connection
    /// when one is available.
    ///
    /// A connection goes back to the pool only after a successful command.
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
    {
        let connections = Arc::clone(&self.connections);
        tokio::task::spawn_blocking(move || {
            let (idle, client) = {
                let mut guard = Self::lock(&connections);
                let Some(client) = guard.client.clone() else {
                    return Err(format!("{op}: {CLOSED}"));
                };
                (guard.idle.pop(), client)
            };
            let mut conn = match idle {
                Some(conn) => conn,
                None => client
                    .get_connection()
                    .map_err(|e| format!("{op} failed: {e}"))?,
            };

            let out = f(&mut conn).map_err(|e| format!("{op} failed: {e}"))?;

            let mut guard = Self::lock(&connections);
            if guard.client.is_some() && guard.idle.len() < MAX_IDLE_CONNECTIONS {
                guard.idle.push(conn);
            }
            Ok(out)
        })
        .await
        .map_err(|e| format!("{op}: worker thread failed: {e}"))?
    }
}

fn decode_job(key: &str, raw: &str) -> Result<Job, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn encode_job(job: &Job) -> Result<String, StoreError> {
    serde_json::to_string(job).map_err(|e| StoreError::Corrupt {
        key: job.id().to_string(),
        reason: e.to_string(),
    })
}

pub struct RedisJobStore {
    backend: RedisBackend,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("backend", &self.backend)
            .finish()
    }
}

impl RedisJobStore {
    pub fn new(backend: RedisBackend) -> Self {
        Self {
            backend,
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            clock: Arc::new(SystemClock),
        }
    }

    async fn transition(
        &self,
        id: JobId,
        status: JobStatus,
        reason: Option<String>,
    ) -> Result<Job, StoreError> {
        // Only the worker that dequeued `id` writes it, so read-modify-write is enough.
        let mut job = self.get(id).await?;
        job.transition(status, reason, self.clock.now())?;

        let key = self.backend.job_key(id);
        let raw = encode_job(&job)?;
        let written: Option<String> = self
            .backend
            .run("SET XX", move |conn| {
                redis::cmd("SET").arg(&key).arg(&raw).arg("XX").query(conn)
            })
            .await
            .map_err(StoreError::Unavailable)?;

        match written {
            Some(_) => Ok(job),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let job = Job::submitted(self.ids.generate_job_id(), new_job, self.clock.now());
        let id = job.id();
        let key = self.backend.job_key(id);
        let list = self.backend.jobs_key();
        let raw = encode_job(&job)?;
        let list_entry = id.to_string();

        let created: i64 = self
            .backend
            .run("create", move |conn| {
                let script = redis::Script::new(CREATE_SCRIPT);
                script
                    .key(&key)
                    .key(&list)
                    .arg(&raw)
                    .arg(&list_entry)
                    .invoke(conn)
            })
            .await
            .map_err(StoreError::Unavailable)?;

        if created == 1 {
            Ok(job)
        } else {
            Err(StoreError::DuplicateId(id))
        }
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let key = self.backend.job_key(id);
        let lookup = key.clone();
        let raw: Option<String> = self
            .backend
            .run("GET", move |conn| redis::cmd("GET").arg(&lookup).query(conn))
            .await
            .map_err(StoreError::Unavailable)?;

        match raw {
            Some(raw) => decode_job(&key, &raw),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<Job, StoreError> {
        self.transition(id, status, None).await
    }

    async fn mark_failed(&self, id: JobId, reason: String) -> Result<Job, StoreError> {
        self.transition(id, JobStatus::Failed, Some(reason)).await
    }

    async fn list_ids(&self) -> Result<Vec<JobId>, StoreError> {
        let list = self.backend.jobs_key();
        let raw: Vec<String> = self
            .backend
            .run("LRANGE", move |conn| {
                redis::cmd("LRANGE").arg(&list).arg(0).arg(-1).query(conn)
            })
            .await
            .map_err(StoreError::Unavailable)?;

        raw.iter()
            .map(|entry| {
                entry.parse().map_err(|e: crate::domain::ParseJobIdError| {
                    StoreError::Corrupt {
                        key: self.backend.jobs_key(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect()
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.backend.close();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RedisJobQueue {
    backend: RedisBackend,
}

impl RedisJobQueue {
    pub fn new(backend: RedisBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, id: JobId) -> Result<(), QueueError> {
        let queue = self.backend.queue_key();
        let entry = id.to_string();
        let _: i64 = self
            .backend
            .run("RPUSH", move |conn| {
                redis::cmd("RPUSH").arg(&queue).arg(&entry).query(conn)
            })
            .await
            .map_err(QueueError::Unavailable)?;
        Ok(())
    }

    async fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<JobId>, QueueError> {
        let queue = self.backend.queue_key();
        // BLPOP treats 0 as "forever".
        let secs = timeout.as_secs_f64().max(0.01);
        let popped: Option<(String, String)> = self
            .backend
            .run("BLPOP", move |conn| {
                redis::cmd("BLPOP").arg(&queue).arg(secs).query(conn)
            })
            .await
            .map_err(QueueError::Unavailable)?;

        match popped {
            None => Ok(None),
            Some((_, entry)) => match entry.parse::<JobId>() {
                Ok(id) => Ok(Some(id)),
                Err(err) => {
                    tracing::warn!(entry = %entry, error = %err, "discarding malformed queue entry");
                    Ok(None)
                }
            },
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let queue = self.backend.queue_key();
        self.backend
            .run("LLEN", move |conn| redis::cmd("LLEN").arg(&queue).query(conn))
            .await
            .map_err(QueueError::Unavailable)
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.backend.close();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RedisResultStore {
    backend: RedisBackend,
}

impl RedisResultStore {
    pub fn new(backend: RedisBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn store_artifact(&self, id: JobId, artifact: Artifact) -> Result<(), StoreError> {
        let key = self.backend.result_key(id);
        let media_type = artifact.media_type().to_string();
        let bytes = artifact.into_bytes();
        let _: i64 = self
            .backend
            .run("HSET", move |conn| {
                redis::cmd("HSET")
                    .arg(&key)
                    .arg("content_type")
                    .arg(&media_type)
                    .arg("image")
                    .arg(bytes.as_slice())
                    .query(conn)
            })
            .await
            .map_err(StoreError::Unavailable)?;
        Ok(())
    }

    async fn get_artifact(&self, id: JobId) -> Result<Artifact, StoreError> {
        let key = self.backend.result_key(id);
        let (media_type, bytes): (Option<String>, Option<Vec<u8>>) = self
            .backend
            .run("HMGET", move |conn| {
                redis::cmd("HMGET")
                    .arg(&key)
                    .arg("content_type")
                    .arg("image")
                    .query(conn)
            })
            .await
            .map_err(StoreError::Unavailable)?;

        match bytes {
            Some(bytes) => Ok(Artifact::new(
                media_type.unwrap_or_else(|| Artifact::SVG.to_string()),
                bytes,
            )),
            None => Err(StoreError::ArtifactNotFound(id)),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.backend.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    /// Integration tests run only when a server is provided.
    fn test_backend() -> Option<RedisBackend> {
        let url = std::env::var("CHARTQ_TEST_REDIS_URL").ok()?;
        let prefix = format!("chartq-test-{}", Ulid::new());
        Some(RedisBackend::open(&url, &prefix).unwrap())
    }

    #[test]
    fn keys_follow_prefix_layout() {
        let backend = RedisBackend::open("redis://127.0.0.1:6379", "charts").unwrap();
        let id: JobId = "job-01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();

        assert_eq!(backend.job_key(id), "charts:job:job-01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(backend.jobs_key(), "charts:jobs");
        assert_eq!(backend.queue_key(), "charts:queue");
        assert_eq!(
            backend.result_key(id),
            "charts:result:job-01ARZ3NDEKTSV4RRFFQ69G5FAV"
        );
    }

    #[test]
    fn invalid_url_is_unavailable() {
        assert!(matches!(
            RedisBackend::open("not a url", DEFAULT_PREFIX),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn calls_after_close_fail_without_connecting() {
        // Client::open does not connect, so no server is needed here.
        let backend = RedisBackend::open("redis://127.0.0.1:1", DEFAULT_PREFIX).unwrap();
        let store = RedisJobStore::new(backend.clone());
        let queue = RedisJobQueue::new(backend.clone());
        let results = RedisResultStore::new(backend.clone());

        store.close().await.unwrap();
        assert!(backend.is_closed());
        // Closing through another handle is a no-op.
        queue.close().await.unwrap();

        let id = JobId::from_ulid(Ulid::new());
        let err = store.get(id).await.unwrap_err();
        assert!(matches!(&err, StoreError::Unavailable(msg) if msg.contains("closed")));
        assert!(matches!(
            queue.enqueue(id).await,
            Err(QueueError::Unavailable(msg)) if msg.contains("closed")
        ));
        assert!(matches!(
            results.get_artifact(id).await,
            Err(StoreError::Unavailable(msg)) if msg.contains("closed")
        ));
    }

    #[tokio::test]
    async fn job_lifecycle_against_live_server() {
        let Some(backend) = test_backend() else {
            return;
        };
        let store = RedisJobStore::new(backend.clone());
        let queue = RedisJobQueue::new(backend.clone());
        let results = RedisResultStore::new(backend);

        let job = store
            .create(NewJob::parse("histogram", json!({"param": "crime_type"})).unwrap())
            .await
            .unwrap();
        queue.enqueue(job.id()).await.unwrap();
        assert_eq!(
            queue.dequeue_timeout(Duration::from_secs(1)).await.unwrap(),
            Some(job.id())
        );

        store
            .update_status(job.id(), JobStatus::InProgress)
            .await
            .unwrap();
        results
            .store_artifact(job.id(), Artifact::svg("<svg/>".into()))
            .await
            .unwrap();
        let done = store
            .update_status(job.id(), JobStatus::Completed)
            .await
            .unwrap();

        assert_eq!(done.status(), JobStatus::Completed);
        assert_eq!(store.list_ids().await.unwrap(), vec![job.id()]);
        assert_eq!(
            results.get_artifact(job.id()).await.unwrap().bytes(),
            b"<svg/>"
        );
    }

    #[tokio::test]
    async fn duplicate_create_leaves_list_unchanged_against_live_server() {
        let Some(backend) = test_backend() else {
            return;
        };
        let id = JobId::from_ulid(Ulid::new());
        let store = RedisJobStore {
            backend,
            ids: Arc::new(crate::impls::inmem_job_store::tests::RepeatingIds(id)),
            clock: Arc::new(SystemClock),
        };
        let new_job = || NewJob::parse("line", json!({})).unwrap();

        store.create(new_job()).await.unwrap();
        assert!(matches!(
            store.create(new_job()).await,
            Err(StoreError::DuplicateId(dup)) if dup == id
        ));
        assert_eq!(store.list_ids().await.unwrap(), vec![id]);
    }
}
