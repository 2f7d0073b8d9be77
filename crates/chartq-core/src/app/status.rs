//! Status - パイプライン全体の件数
//!
//! in_progress が減らない場合は、ワーカーが dequeue 後に落ちた可能性があります
//! （再配送はしないので、この件数で検知する）。

use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub submitted: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    /// Ids waiting in the queue.
    pub queued: usize,
}

impl StatusCounts {
    pub fn tally<'a>(jobs: impl IntoIterator<Item = &'a Job>, queued: usize) -> Self {
        let mut counts = Self {
            queued,
            ..Self::default()
        };
        for job in jobs {
            match job.status() {
                JobStatus::Submitted => counts.submitted += 1,
                JobStatus::InProgress => counts.in_progress += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.submitted + self.in_progress + self.completed + self.failed
    }

    /// Jobs not yet in a terminal status.
    pub fn pending(&self) -> usize {
        self.submitted + self.in_progress
    }
}
