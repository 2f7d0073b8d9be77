//! DatasetSource port - 外部データセットの取得
//!
//! 取得できなかった場合は `DatasetError::Unavailable` を返すこと。
//! 空のデータセットとして扱ってはいけない。

use async_trait::async_trait;

use crate::domain::{DatasetError, Record};

#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Record>, DatasetError>;
}
