//! Job record and its status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{StoreError, ValidationError};
use super::ids::JobId;
use super::job_type::JobType;
use super::status::JobStatus;

/// Job parameters. Insertion order is preserved.
pub type Params = serde_json::Map<String, Value>;

/// A validated submission, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    job_type: JobType,
    params: Params,
}

impl NewJob {
    pub fn new(job_type: JobType, params: Params) -> Self {
        Self { job_type, params }
    }

    /// Validate raw submission input.
    pub fn parse(job_type: &str, params: Value) -> Result<Self, ValidationError> {
        let job_type = JobType::new(job_type)?;
        match params {
            Value::Object(params) => Ok(Self { job_type, params }),
            other => Err(ValidationError::ParamsNotObject(json_type_name(&other))),
        }
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Job record: the unit the gateway hands out and workers drive to completion.
///
/// `id`, `job_type` and `params` are fixed at creation; only `transition`
/// mutates the record, and only along the forward-only status graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    status: JobStatus,
    job_type: JobType,
    params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly created record in `submitted`.
    pub fn submitted(id: JobId, new_job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Submitted,
            job_type: new_job.job_type,
            params: new_job.params,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Failure reason, set only when `status == failed`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Move to `next`, recording `reason` when the new status is `failed`.
    ///
    /// Every store implementation routes updates through here, so the graph is
    /// enforced in one place.
    pub fn transition(
        &mut self,
        next: JobStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.error = if next == JobStatus::Failed {
            Some(reason.unwrap_or_else(|| "failed".to_string()))
        } else {
            None
        };
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use ulid::Ulid;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn histogram_job() -> Job {
        let new_job = NewJob::parse("histogram", json!({"param": "crime_type"})).unwrap();
        Job::submitted(JobId::from_ulid(Ulid::new()), new_job, t(0))
    }

    #[test]
    fn parse_rejects_non_object_params() {
        assert_eq!(
            NewJob::parse("histogram", json!(["a"])),
            Err(ValidationError::ParamsNotObject("array"))
        );
        assert_eq!(
            NewJob::parse("histogram", Value::Null),
            Err(ValidationError::ParamsNotObject("null"))
        );
        assert_eq!(
            NewJob::parse("", json!({})),
            Err(ValidationError::EmptyJobType)
        );
    }

    #[test]
    fn params_keep_insertion_order() {
        let new_job = NewJob::parse("line", json!({"z": 1, "a": 2, "m": 3})).unwrap();
        let keys: Vec<&str> = new_job.params().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn submitted_job_matches_input() {
        let job = histogram_job();
        assert_eq!(job.status(), JobStatus::Submitted);
        assert_eq!(job.job_type().as_str(), "histogram");
        assert_eq!(job.params()["param"], json!("crime_type"));
        assert_eq!(job.error(), None);
        assert_eq!(job.created_at(), job.updated_at());
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = histogram_job();
        job.transition(JobStatus::InProgress, None, t(1)).unwrap();
        job.transition(JobStatus::Completed, None, t(2)).unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.updated_at(), t(2));
        assert_eq!(job.created_at(), t(0));
    }

    #[test]
    fn failure_records_reason() {
        let mut job = histogram_job();
        job.transition(JobStatus::InProgress, None, t(1)).unwrap();
        job.transition(JobStatus::Failed, Some("boom".into()), t(2))
            .unwrap();

        assert_eq!(job.error(), Some("boom"));
    }

    #[test]
    fn rejected_transition_leaves_record_untouched() {
        let mut job = histogram_job();
        let before = job.clone();

        let err = job
            .transition(JobStatus::Completed, None, t(5))
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(job, before);
    }

    #[test]
    fn record_round_trips_through_json() {
        let job = histogram_job();
        let text = serde_json::to_string(&job).unwrap();
        assert!(text.contains("\"status\":\"submitted\""));
        assert!(!text.contains("\"error\""));

        let back: Job = serde_json::from_str(&text).unwrap();
        assert_eq!(back, job);
    }
}
