//! In-memory job record store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Job, JobId, JobStatus, NewJob, StoreError};
use crate::ports::{Clock, IdGenerator, JobStore, SystemClock, UlidGenerator};

/// Records plus their insertion order.
#[derive(Debug, Default, Clone)]
pub(crate) struct JobTable {
    order: Vec<JobId>,
    jobs: HashMap<JobId, Job>,
}

impl JobTable {
    pub(crate) fn insert_new(&mut self, job: Job) -> Result<(), StoreError> {
        let id = job.id();
        if self.jobs.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        self.jobs.insert(id, job);
        self.order.push(id);
        Ok(())
    }

    pub(crate) fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    pub(crate) fn ids(&self) -> Vec<JobId> {
        self.order.clone()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Job> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    pub(crate) fn from_jobs(jobs: Vec<Job>) -> Self {
        let mut table = Self::default();
        for job in jobs {
            let id = job.id();
            if table.jobs.insert(id, job).is_none() {
                table.order.push(id);
            }
        }
        table
    }
}

/// Apply a status change through `Job::transition`, returning the new record.
///
/// On error the table is left untouched.
pub(crate) fn apply_transition(
    table: &mut JobTable,
    id: JobId,
    status: JobStatus,
    reason: Option<String>,
    clock: &dyn Clock,
) -> Result<Job, StoreError> {
    let job = table.get_mut(&id).ok_or(StoreError::NotFound(id))?;
    job.transition(status, reason, clock.now())?;
    Ok(job.clone())
}

/// InMemoryJobStore は開発・テスト用の JobStore
///
/// 複数リーダー・単一ライター（ワーカー）を RwLock で表現します。
pub struct InMemoryJobStore {
    table: RwLock<JobTable>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for InMemoryJobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryJobStore")
            .field("table", &"<RwLock<JobTable>>")
            .finish()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(UlidGenerator::new(SystemClock)), Arc::new(SystemClock))
    }

    pub fn with_parts(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(JobTable::default()),
            ids,
            clock,
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let job = Job::submitted(self.ids.generate_job_id(), new_job, self.clock.now());
        self.table.write().await.insert_new(job.clone())?;
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.table
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<Job, StoreError> {
        let mut table = self.table.write().await;
        apply_transition(&mut table, id, status, None, self.clock.as_ref())
    }

    async fn mark_failed(&self, id: JobId, reason: String) -> Result<Job, StoreError> {
        let mut table = self.table.write().await;
        apply_transition(
            &mut table,
            id,
            JobStatus::Failed,
            Some(reason),
            self.clock.as_ref(),
        )
    }

    async fn list_ids(&self) -> Result<Vec<JobId>, StoreError> {
        Ok(self.table.read().await.ids())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashSet;
    use ulid::Ulid;

    /// Hands out the same id every time, to provoke collisions.
    pub(crate) struct RepeatingIds(pub JobId);

    impl IdGenerator for RepeatingIds {
        fn generate_job_id(&self) -> JobId {
            self.0
        }
    }

    fn histogram() -> NewJob {
        NewJob::parse("histogram", json!({"param": "crime_type"})).unwrap()
    }

    #[tokio::test]
    async fn create_then_get_returns_submitted_record() {
        let store = InMemoryJobStore::new();
        let created = store.create(histogram()).await.unwrap();

        let fetched = store.get(created.id()).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.status(), JobStatus::Submitted);
        assert_eq!(fetched.params()["param"], json!("crime_type"));
    }

    #[tokio::test]
    async fn created_ids_are_pairwise_distinct() {
        let store = InMemoryJobStore::new();
        let mut ids = HashSet::new();
        for _ in 0..500 {
            ids.insert(store.create(histogram()).await.unwrap().id());
        }
        assert_eq!(ids.len(), 500);
    }

    #[tokio::test]
    async fn id_collision_fails_instead_of_overwriting() {
        let id = JobId::from_ulid(Ulid::new());
        let store = InMemoryJobStore::with_parts(Arc::new(RepeatingIds(id)), Arc::new(SystemClock));

        let first = store.create(histogram()).await.unwrap();
        store.update_status(id, JobStatus::InProgress).await.unwrap();

        let err = store.create(histogram()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(dup) if dup == first.id()));
        assert_eq!(store.get(id).await.unwrap().status(), JobStatus::InProgress);
        assert_eq!(store.list_ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = InMemoryJobStore::new();
        let id = JobId::from_ulid(Ulid::new());

        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update_status(id, JobStatus::InProgress).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_status_enforces_graph_and_stamps_time() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let store = InMemoryJobStore::with_parts(
            Arc::new(UlidGenerator::new(SystemClock)),
            clock.clone(),
        );
        let id = store.create(histogram()).await.unwrap().id();

        let err = store.update_status(id, JobStatus::Completed).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        clock.advance(Duration::seconds(10));
        let job = store.update_status(id, JobStatus::InProgress).await.unwrap();
        assert_eq!(job.updated_at(), start + Duration::seconds(10));
        assert_eq!(job.created_at(), start);

        let job = store.mark_failed(id, "dataset down".into()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("dataset down"));
    }

    #[tokio::test]
    async fn list_ids_keeps_insertion_order() {
        let store = InMemoryJobStore::new();
        let mut expected = Vec::new();
        for _ in 0..5 {
            expected.push(store.create(histogram()).await.unwrap().id());
        }
        assert_eq!(store.list_ids().await.unwrap(), expected);
    }
}
