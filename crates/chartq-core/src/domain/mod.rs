//! Domain model (ids, job records, status graph, artifacts, errors).

pub mod artifact;
pub mod dataset;
pub mod errors;
pub mod ids;
pub mod job;
pub mod job_type;
pub mod status;

pub use self::artifact::Artifact;
pub use self::dataset::{Record, records_from_json};
pub use self::errors::{
    DatasetError, ErrorKind, QueueError, StoreError, TaskError, ValidationError,
};
pub use self::ids::{JobId, ParseJobIdError};
pub use self::job::{Job, NewJob, Params};
pub use self::job_type::JobType;
pub use self::status::{JobStatus, ParseJobStatusError};
