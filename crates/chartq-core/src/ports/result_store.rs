//! ResultStore port - 成果物（artifact）の保存先
//!
//! # 設計原則
//! - store_artifact は上書き or 作成（正常系ではジョブごとに 1 回だけ呼ばれる）
//! - 未保存の id は `StoreError::ArtifactNotFound`（pending / failed のジョブも含む）

use async_trait::async_trait;

use crate::domain::{Artifact, JobId, StoreError};

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn store_artifact(&self, id: JobId, artifact: Artifact) -> Result<(), StoreError>;

    async fn get_artifact(&self, id: JobId) -> Result<Artifact, StoreError>;

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
