//! Pipeline configuration.
//!
//! すべてのフィールドにデフォルト値があるので、空の JSON `{}` でも有効な設定になります。
//! CLI はコマンドライン引数・環境変数からこの型を組み立てます。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Record;
use crate::impls::{JsonFileDataset, StaticDataset};
use crate::ports::DatasetSource;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("workers must be at least 1")]
    NoWorkers,

    #[error("poll_interval_ms must be at least 1")]
    ZeroPollInterval,

    #[error("retry multiplier must be >= 1.0, got {0}")]
    ShrinkingBackoff(f64),

    #[error("'{0}' support was not compiled in (enable the '{0}' feature)")]
    FeatureDisabled(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub dataset: DatasetConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval_ms: 1000,
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::ShrinkingBackoff(self.retry.multiplier));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Backoff applied while a store or the queue is unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local; state is lost on exit.
    #[default]
    Memory,
    /// Durable for a single process.
    Fs { dir: PathBuf },
    /// Shared between processes.
    Redis {
        url: String,
        #[serde(default = "default_redis_prefix")]
        prefix: String,
    },
}

fn default_redis_prefix() -> String {
    "chartq".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetConfig {
    File { path: PathBuf },
    Url { url: String },
    Inline { records: Vec<Record> },
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::Inline {
            records: Vec::new(),
        }
    }
}

impl DatasetConfig {
    pub fn open(&self) -> Result<Arc<dyn DatasetSource>, ConfigError> {
        match self {
            Self::File { path } => Ok(Arc::new(JsonFileDataset::new(path.clone()))),
            Self::Inline { records } => Ok(Arc::new(StaticDataset::new(records.clone()))),
            #[cfg(feature = "http")]
            Self::Url { url } => Ok(Arc::new(crate::impls::HttpDataset::new(url.clone()))),
            #[cfg(not(feature = "http"))]
            Self::Url { .. } => Err(ConfigError::FeatureDisabled("http")),
        }
    }
}
