//! TaskRegistry - task body の登録と解決
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権（ワーカー間で同じ body を共有）

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{Handler, TaskBody, TypedHandler};
use super::task::Task;
use crate::domain::ErrorKind;

/// TaskRegistry は job_type → task body の対応を管理
///
/// # 使用例
/// ```ignore
/// let mut registry = TaskRegistry::new();
/// registry.register::<HistogramTask, _>(HistogramHandler)?;
///
/// let body = registry.resolve("histogram")?;
/// let artifact = body.run(job.params(), &dataset)?;
/// ```
#[derive(Default, Clone)]
pub struct TaskRegistry {
    bodies: HashMap<String, Arc<dyn TaskBody>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("task body for job type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no task body registered for job type '{0}'")]
    UnknownJobType(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyRegistered(_) => ErrorKind::Validation,
            Self::UnknownJobType(_) => ErrorKind::UnknownJobType,
        }
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("job_types", &self.registered_types())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_body(Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    /// Register an already type-erased body under its own `job_type()`.
    pub fn register_body(&mut self, body: Arc<dyn TaskBody>) -> Result<(), RegistryError> {
        let job_type = body.job_type().to_string();
        if self.bodies.contains_key(&job_type) {
            return Err(RegistryError::AlreadyRegistered(job_type));
        }
        self.bodies.insert(job_type, body);
        Ok(())
    }

    pub fn resolve(&self, job_type: &str) -> Result<Arc<dyn TaskBody>, RegistryError> {
        self.bodies
            .get(job_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownJobType(job_type.to_string()))
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.bodies.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.bodies.keys().cloned().collect();
        types.sort();
        types
    }
}
