//! JobQueue port - 配送キュー
//!
//! JobQueue は job id のみを流します（状態や params は JobStore にある）。
//!
//! # 設計原則
//! - FIFO、容量制限なし（enqueue はブロックしない・捨てない）
//! - dequeue は 1 つの id をちょうど 1 人の呼び出し元にだけ渡す
//! - ワーカーは dequeue_timeout を最後まで待ち、その合間に shutdown を確認する
//!   （Redis の BLPOP は途中で打ち切れないため、future を drop しない）

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{JobId, QueueError};

/// Wait slice used by the default blocking `dequeue`.
const DEQUEUE_SLICE: Duration = Duration::from_secs(5);

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append an id to the tail of the queue.
    async fn enqueue(&self, id: JobId) -> Result<(), QueueError>;

    /// Wait at most `timeout` for the head of the queue.
    async fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<JobId>, QueueError>;

    /// Wait until an id is available and take it.
    async fn dequeue(&self) -> Result<JobId, QueueError> {
        loop {
            if let Some(id) = self.dequeue_timeout(DEQUEUE_SLICE).await? {
                return Ok(id);
            }
        }
    }

    /// Number of ids waiting.
    async fn len(&self) -> Result<usize, QueueError>;

    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
