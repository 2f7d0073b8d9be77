//! DatasetSource implementations.
//!
//! - **StaticDataset**: メモリ上のレコード（テスト・インライン指定用）
//! - **JsonFileDataset**: JSON 配列ファイルを毎回読み込む
//! - **HttpDataset**: JSON を返す HTTP エンドポイント（feature = "http"）

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{DatasetError, Record, records_from_json};
use crate::ports::DatasetSource;

#[derive(Debug, Clone, Default)]
pub struct StaticDataset {
    records: Arc<Vec<Record>>,
}

impl StaticDataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, DatasetError> {
        records_from_json(value).map(Self::new)
    }
}

#[async_trait]
impl DatasetSource for StaticDataset {
    async fn fetch(&self) -> Result<Vec<Record>, DatasetError> {
        Ok(self.records.as_ref().clone())
    }
}

/// Reads the file on every fetch so edits are picked up without a restart.
#[derive(Debug, Clone)]
pub struct JsonFileDataset {
    path: PathBuf,
}

impl JsonFileDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DatasetSource for JsonFileDataset {
    async fn fetch(&self) -> Result<Vec<Record>, DatasetError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            DatasetError::Unavailable(format!("reading {}: {e}", self.path.display()))
        })?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            DatasetError::Malformed(format!("parsing {}: {e}", self.path.display()))
        })?;
        records_from_json(value)
    }
}

#[cfg(feature = "http")]
pub use self::http::HttpDataset;

#[cfg(feature = "http")]
mod http {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct HttpDataset {
        client: reqwest::Client,
        url: String,
    }

    impl HttpDataset {
        pub fn new(url: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                url: url.into(),
            }
        }
    }

    #[async_trait]
    impl DatasetSource for HttpDataset {
        async fn fetch(&self) -> Result<Vec<Record>, DatasetError> {
            let response = self.client.get(&self.url).send().await.map_err(|e| {
                DatasetError::Unavailable(format!("fetching '{}': {e}", self.url))
            })?;

            if !response.status().is_success() {
                return Err(DatasetError::Unavailable(format!(
                    "'{}' returned status {}",
                    self.url,
                    response.status()
                )));
            }

            let value: serde_json::Value = response.json().await.map_err(|e| {
                DatasetError::Malformed(format!("parsing response from '{}': {e}", self.url))
            })?;
            records_from_json(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn file_dataset_reads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crimes.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&json!([{"crime_type": "Theft"}, {"crime_type": "Arson"}])).unwrap(),
        )
        .unwrap();

        let records = JsonFileDataset::new(&path).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["crime_type"], json!("Theft"));
    }

    #[tokio::test]
    async fn missing_file_is_unavailable_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonFileDataset::new(dir.path().join("absent.json"))
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Unavailable(_)));
    }

    #[tokio::test]
    async fn garbage_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"[{").unwrap();

        let err = JsonFileDataset::new(&path).fetch().await.unwrap_err();
        assert!(matches!(err, DatasetError::Malformed(_)));
    }

    #[tokio::test]
    async fn static_dataset_hands_out_copies() {
        let dataset = StaticDataset::from_json(json!([{"a": "1"}])).unwrap();
        let mut first = dataset.fetch().await.unwrap();
        first.clear();
        assert_eq!(dataset.fetch().await.unwrap().len(), 1);
    }
}
