//! In-memory artifact store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Artifact, JobId, StoreError};
use crate::ports::ResultStore;

#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    artifacts: RwLock<HashMap<JobId, Artifact>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn store_artifact(&self, id: JobId, artifact: Artifact) -> Result<(), StoreError> {
        self.artifacts.write().await.insert(id, artifact);
        Ok(())
    }

    async fn get_artifact(&self, id: JobId) -> Result<Artifact, StoreError> {
        self.artifacts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::ArtifactNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let store = InMemoryResultStore::new();
        let id = JobId::from_ulid(Ulid::new());
        assert!(matches!(
            store.get_artifact(id).await,
            Err(StoreError::ArtifactNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn store_overwrites() {
        let store = InMemoryResultStore::new();
        let id = JobId::from_ulid(Ulid::new());

        store
            .store_artifact(id, Artifact::svg("<svg>1</svg>".into()))
            .await
            .unwrap();
        store
            .store_artifact(id, Artifact::svg("<svg>2</svg>".into()))
            .await
            .unwrap();

        let artifact = store.get_artifact(id).await.unwrap();
        assert_eq!(artifact.bytes(), b"<svg>2</svg>");
        assert_eq!(artifact.media_type(), Artifact::SVG);
    }
}
