//! InMemoryJobQueue - プロセス内の配送キュー
//!
//! # 学習ポイント
//! - Mutex + Notify による blocking dequeue
//! - 待機登録（`enable`）をキュー確認より先に行い、通知の取りこぼしを防ぐ
//! - pop と return の間に await を挟まないので、待機中にキャンセルされても id は失われない

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::domain::{JobId, QueueError};
use crate::ports::JobQueue;

/// InMemoryJobQueue は開発用・単一プロセス用の FIFO キュー
///
/// # 実装詳細
/// - VecDeque<JobId> を Mutex で排他制御
/// - enqueue 時に Notify で待機中のワーカーを 1 つ起こす
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryJobQueue::new();
/// queue.enqueue(job_id).await?;
/// let next = queue.dequeue().await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryJobQueue {
    ready: Arc<Mutex<VecDeque<JobId>>>,
    notify: Arc<Notify>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_pop(&self) -> Option<JobId> {
        self.ready.lock().await.pop_front()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, id: JobId) -> Result<(), QueueError> {
        self.ready.lock().await.push_back(id);
        // ロック解放後に通知
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<JobId, QueueError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(id) = self.try_pop().await {
                return Ok(id);
            }
            notified.await;
        }
    }

    async fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<JobId>, QueueError> {
        match tokio::time::timeout(timeout, self.dequeue()).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.ready.lock().await.len())
    }
}
