//! WorkerLoop - ジョブ実行ループ
//!
//! # フロー（1 ジョブあたり）
//! 1. JobQueue::dequeue_timeout() で job id を取得
//! 2. JobStore::update_status(in_progress)（存在しなければ破棄）
//! 3. TaskRegistry::resolve(job_type)（未登録なら failed）
//! 4. DatasetSource::fetch() → task body を blocking スレッドで実行
//! 5. ResultStore::store_artifact() → JobStore::update_status(completed)
//!
//! # 設計原則
//! - ジョブ単位の失敗は必ず failed として記録し、ループは止めない
//! - ストア・キューに届かない間は backoff でリトライ（failed にはしない）
//! - shutdown は dequeue の合間にだけ確認する（実行中のジョブは最後まで走る）

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::builder::App;
use super::context::Context;
use super::retry::{Backoff, pause, retry_transient};
use crate::domain::{Artifact, Job, JobId, JobStatus, StoreError, TaskError};
use crate::ports::DatasetSource;
use crate::typed::TaskRegistry;

/// What happened to one dequeued id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    /// The record was missing or already claimed; nothing was written.
    Abandoned,
    /// Shutdown arrived while a store was unreachable; the record may be left
    /// `in_progress`.
    Interrupted,
}

/// One worker: pulls ids and drives each job to a terminal status.
pub struct WorkerLoop {
    worker_id: usize,
    ctx: Context,
    registry: Arc<TaskRegistry>,
    dataset: Arc<dyn DatasetSource>,
    backoff: Backoff,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl WorkerLoop {
    pub fn new(worker_id: usize, app: &App, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            worker_id,
            ctx: app.context.clone(),
            registry: Arc::clone(&app.registry),
            dataset: Arc::clone(&app.dataset),
            backoff: app.backoff.clone(),
            poll_interval: app.poll_interval,
            shutdown,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run until shutdown. Returns how many ids this worker handled.
    pub async fn run(mut self) -> usize {
        info!(worker_id = self.worker_id, "worker started");
        let mut handled = 0usize;
        let mut queue_failures = 0u32;

        while !self.shutdown_requested() {
            // Always awaited to completion: a cancelled BLPOP could swallow an id.
            match self.ctx.queue.dequeue_timeout(self.poll_interval).await {
                Ok(Some(id)) => {
                    queue_failures = 0;
                    handled += 1;
                    self.process_one(id).await;
                }
                Ok(None) => queue_failures = 0,
                Err(err) => {
                    queue_failures += 1;
                    let delay = self.backoff.next_delay(queue_failures);
                    warn!(
                        worker_id = self.worker_id,
                        attempts = queue_failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "dequeue failed, backing off"
                    );
                    if !pause(delay, &mut self.shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(worker_id = self.worker_id, handled, "worker stopped");
        handled
    }

    /// Drive one dequeued id through the job state machine.
    pub async fn process_one(&mut self, id: JobId) -> JobOutcome {
        let span = info_span!("job", worker_id = self.worker_id, job_id = %id);
        self.process_inner(id).instrument(span).await
    }

    async fn process_inner(&mut self, id: JobId) -> JobOutcome {
        let jobs = &self.ctx.jobs;
        let claimed = retry_transient(&self.backoff, &mut self.shutdown, "claim", || {
            jobs.update_status(id, JobStatus::InProgress)
        })
        .await;

        let job = match claimed {
            None => return JobOutcome::Interrupted,
            Some(Ok(job)) => job,
            Some(Err(StoreError::NotFound(_))) => {
                warn!("job record no longer exists, abandoning id");
                return JobOutcome::Abandoned;
            }
            Some(Err(err @ StoreError::InvalidTransition { .. })) => {
                warn!(error = %err, "job already claimed or finished, abandoning id");
                return JobOutcome::Abandoned;
            }
            Some(Err(err)) => {
                error!(error = %err, "could not claim job, abandoning id");
                return JobOutcome::Abandoned;
            }
        };
        debug!(job_type = %job.job_type(), "job claimed");

        match self.execute(&job).await {
            Ok(artifact) => self.complete(id, artifact).await,
            Err(reason) => self.fail(id, reason).await,
        }
    }

    /// Resolve the body, fetch the dataset, and run the body off the async runtime.
    async fn execute(&self, job: &Job) -> Result<Artifact, String> {
        let body = self
            .registry
            .resolve(job.job_type().as_str())
            .map_err(|e| e.to_string())?;

        let dataset = self
            .dataset
            .fetch()
            .await
            .map_err(|e| TaskError::from(e).to_string())?;

        let params = job.params().clone();
        let joined = tokio::task::spawn_blocking(move || body.run(&params, &dataset)).await;

        let result = match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(TaskError::Panicked(panic_message(join_err.into_panic())))
            }
            Err(join_err) => Err(TaskError::Failed(join_err.to_string())),
        };
        result.map_err(|e| e.to_string())
    }

    async fn complete(&mut self, id: JobId, artifact: Artifact) -> JobOutcome {
        let results = &self.ctx.results;
        let stored = retry_transient(&self.backoff, &mut self.shutdown, "store_artifact", || {
            results.store_artifact(id, artifact.clone())
        })
        .await;
        match stored {
            None => return JobOutcome::Interrupted,
            Some(Ok(())) => {}
            Some(Err(err)) => return self.fail(id, format!("storing artifact: {err}")).await,
        }

        let jobs = &self.ctx.jobs;
        let done = retry_transient(&self.backoff, &mut self.shutdown, "complete", || {
            jobs.update_status(id, JobStatus::Completed)
        })
        .await;
        match done {
            None => JobOutcome::Interrupted,
            Some(Ok(_)) => {
                info!(bytes = artifact.len(), "job completed");
                JobOutcome::Completed
            }
            Some(Err(err)) => {
                error!(error = %err, "could not record completion");
                JobOutcome::Abandoned
            }
        }
    }

    async fn fail(&mut self, id: JobId, reason: String) -> JobOutcome {
        warn!(reason = %reason, "job failed");
        let jobs = &self.ctx.jobs;
        let marked = retry_transient(&self.backoff, &mut self.shutdown, "mark_failed", || {
            jobs.mark_failed(id, reason.clone())
        })
        .await;
        match marked {
            None => JobOutcome::Interrupted,
            Some(Ok(_)) => JobOutcome::Failed(reason),
            Some(Err(err)) => {
                error!(error = %err, "could not record failure");
                JobOutcome::Abandoned
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Worker group handle.
/// - `request_shutdown()` で全ワーカーに停止を通知（実行中のジョブは完了させる）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<usize>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, app: &App) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let worker = WorkerLoop::new(worker_id, app, shutdown_rx.clone());
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers = n, "worker group started");
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers. Returns the total number of ids handled.
    pub async fn shutdown_and_join(self) -> usize {
        self.request_shutdown();
        let mut handled = 0;
        for join in self.joins {
            match join.await {
                Ok(n) => handled += n,
                Err(err) => error!(error = %err, "worker task ended abnormally"),
            }
        }
        handled
    }
}
