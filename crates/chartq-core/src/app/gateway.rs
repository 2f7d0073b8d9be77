//! Gateway - 投入・参照の窓口
//!
//! HTTP などの外側の層はこの型だけを呼びます。
//! エラーは `GatewayError::kind()` で分類できるので、文字列で判定する必要はありません。

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::context::Context;
use super::status::StatusCounts;
use crate::domain::{
    Artifact, ErrorKind, Job, JobId, JobStatus, NewJob, QueueError, StoreError, ValidationError,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("no result for {id}: job is {status}")]
    ResultNotReady { id: JobId, status: JobStatus },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Store(err) => err.kind(),
            Self::Queue(err) => err.kind(),
            Self::ResultNotReady { .. } => ErrorKind::NotFound,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gateway {
    ctx: Context,
}

impl Gateway {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Validate, persist and enqueue a job.
    ///
    /// If the id cannot be enqueued the record is marked `failed` so it does
    /// not sit in `submitted` forever, and the queue error is returned.
    pub async fn submit(&self, job_type: &str, params: Value) -> Result<Job, GatewayError> {
        let new_job = NewJob::parse(job_type, params)?;
        let job = self.ctx.jobs.create(new_job).await?;

        if let Err(err) = self.ctx.queue.enqueue(job.id()).await {
            tracing::error!(job_id = %job.id(), error = %err, "enqueue failed");
            if let Err(mark) = self
                .ctx
                .jobs
                .mark_failed(job.id(), format!("enqueue failed: {err}"))
                .await
            {
                tracing::warn!(job_id = %job.id(), error = %mark, "could not record enqueue failure");
            }
            return Err(err.into());
        }

        tracing::info!(job_id = %job.id(), job_type = %job.job_type(), "job submitted");
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Job, GatewayError> {
        Ok(self.ctx.jobs.get(id).await?)
    }

    pub async fn list_ids(&self) -> Result<Vec<JobId>, GatewayError> {
        Ok(self.ctx.jobs.list_ids().await?)
    }

    /// Every record, in insertion order.
    pub async fn list(&self) -> Result<Vec<Job>, GatewayError> {
        let mut jobs = Vec::new();
        for id in self.ctx.jobs.list_ids().await? {
            jobs.push(self.ctx.jobs.get(id).await?);
        }
        Ok(jobs)
    }

    /// The artifact of a completed job.
    pub async fn result(&self, id: JobId) -> Result<Artifact, GatewayError> {
        let job = self.ctx.jobs.get(id).await?;
        if job.status() != JobStatus::Completed {
            return Err(GatewayError::ResultNotReady {
                id,
                status: job.status(),
            });
        }
        Ok(self.ctx.results.get_artifact(id).await?)
    }

    pub async fn counts(&self) -> Result<StatusCounts, GatewayError> {
        let jobs = self.list().await?;
        let queued = self.ctx.queue.len().await?;
        Ok(StatusCounts::tally(&jobs, queued))
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_terminal(&self, id: JobId, poll: Duration) -> Result<Job, GatewayError> {
        loop {
            let job = self.get(id).await?;
            if job.status().is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryJobStore, InMemoryResultStore};
    use crate::ports::JobQueue;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use ulid::Ulid;

    struct BrokenQueue;

    #[async_trait]
    impl JobQueue for BrokenQueue {
        async fn enqueue(&self, _id: JobId) -> Result<(), QueueError> {
            Err(QueueError::Unavailable("connection refused".into()))
        }

        async fn dequeue_timeout(&self, _timeout: Duration) -> Result<Option<JobId>, QueueError> {
            Ok(None)
        }

        async fn len(&self) -> Result<usize, QueueError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn submit_returns_submitted_record_and_enqueues() {
        let ctx = Context::in_memory();
        let gateway = Gateway::new(ctx.clone());

        let job = gateway
            .submit("histogram", json!({"param": "crime_type"}))
            .await
            .unwrap();

        assert_eq!(job.status(), JobStatus::Submitted);
        assert_eq!(gateway.get(job.id()).await.unwrap(), job);
        assert_eq!(ctx.queue.len().await.unwrap(), 1);
        assert_eq!(gateway.list_ids().await.unwrap(), vec![job.id()]);
    }

    #[tokio::test]
    async fn invalid_submission_creates_nothing() {
        let gateway = Gateway::new(Context::in_memory());

        let err = gateway.submit("", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = gateway.submit("histogram", json!("param")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(gateway.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_failure_marks_job_failed() {
        let ctx = Context::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(BrokenQueue),
            Arc::new(InMemoryResultStore::new()),
        );
        let gateway = Gateway::new(ctx);

        let err = gateway
            .submit("histogram", json!({"param": "c"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        let jobs = gateway.list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status(), JobStatus::Failed);
        assert!(jobs[0].error().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn result_is_not_found_until_completed() {
        let ctx = Context::in_memory();
        let gateway = Gateway::new(ctx.clone());
        let job = gateway.submit("line", json!({})).await.unwrap();

        let err = gateway.result(job.id()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        ctx.jobs
            .update_status(job.id(), JobStatus::InProgress)
            .await
            .unwrap();
        ctx.results
            .store_artifact(job.id(), Artifact::svg("<svg/>".into()))
            .await
            .unwrap();
        assert_eq!(
            gateway.result(job.id()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        ctx.jobs
            .update_status(job.id(), JobStatus::Completed)
            .await
            .unwrap();
        assert_eq!(gateway.result(job.id()).await.unwrap().bytes(), b"<svg/>");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let gateway = Gateway::new(Context::in_memory());
        let id = JobId::from_ulid(Ulid::new());

        assert_eq!(gateway.get(id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            gateway.result(id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn counts_include_queue_length() {
        let gateway = Gateway::new(Context::in_memory());
        gateway.submit("line", json!({})).await.unwrap();
        gateway.submit("line", json!({})).await.unwrap();

        let counts = gateway.counts().await.unwrap();
        assert_eq!(counts.submitted, 2);
        assert_eq!(counts.queued, 2);
    }
}
