//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::context::Context;
use super::gateway::Gateway;
use super::retry::Backoff;
use super::worker_loop::{WorkerGroup, WorkerLoop};
use crate::config::PipelineConfig;
use crate::ports::DatasetSource;
use crate::tasks::register_builtin_tasks;
use crate::typed::{Handler, RegistryError, Task, TaskRegistry};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .with_builtin_tasks()?
///     .expect_tasks(&["histogram", "line"])
///     .context(Context::open(&config.storage).await?)
///     .dataset(config.dataset.open()?)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で期待される job_type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - context / dataset が未設定なら BuildError を返す
pub struct AppBuilder {
    registry: TaskRegistry,
    expected_tasks: Option<Vec<String>>,
    context: Option<Context>,
    dataset: Option<Arc<dyn DatasetSource>>,
    backoff: Backoff,
    poll_interval: Duration,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error("Missing component: {0}. Set it on the builder before build().")]
    MissingComponent(&'static str),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: TaskRegistry::new(),
            expected_tasks: None,
            context: None,
            dataset: None,
            backoff: Backoff::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Handler を登録
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// histogram / line を登録
    pub fn with_builtin_tasks(mut self) -> Result<Self, RegistryError> {
        register_builtin_tasks(&mut self.registry)?;
        Ok(self)
    }

    /// 期待される job_type のリストを設定
    pub fn expect_tasks(mut self, job_types: &[&str]) -> Self {
        self.expected_tasks = Some(job_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn dataset(mut self, dataset: Arc<dyn DatasetSource>) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// How long a worker waits on the queue before re-checking for shutdown.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Take worker settings (backoff, poll interval) from a config.
    pub fn with_config(self, config: &PipelineConfig) -> Self {
        self.backoff(Backoff::from(&config.retry))
            .poll_interval(config.poll_interval())
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - expect_tasks() で設定された job_type が全て登録されているかチェック
    /// - context と dataset が設定されているかチェック
    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }
        let context = self.context.ok_or(BuildError::MissingComponent("context"))?;
        let dataset = self.dataset.ok_or(BuildError::MissingComponent("dataset"))?;

        tracing::debug!(job_types = ?self.registry.registered_types(), "app built");
        Ok(App {
            context,
            registry: Arc::new(self.registry),
            dataset,
            backoff: self.backoff,
            poll_interval: self.poll_interval,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は組み立て済みのパイプライン
///
/// Gateway（投入・参照）と WorkerGroup（実行）はどちらも App から作ります。
pub struct App {
    pub(crate) context: Context,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) dataset: Arc<dyn DatasetSource>,
    pub(crate) backoff: Backoff,
    pub(crate) poll_interval: Duration,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("registry", &self.registry)
            .field("backoff", &self.backoff)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl App {
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> Gateway {
        Gateway::new(self.context.clone())
    }

    pub fn spawn_workers(&self, n: usize) -> WorkerGroup {
        WorkerGroup::spawn(n, self)
    }

    /// A single worker, for callers that drive the loop themselves.
    pub fn worker(&self, worker_id: usize, shutdown: watch::Receiver<bool>) -> WorkerLoop {
        WorkerLoop::new(worker_id, self, shutdown)
    }

    pub async fn close(&self) -> Result<(), super::context::ContextError> {
        self.context.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::StaticDataset;
    use crate::tasks::job_types;

    fn complete() -> AppBuilder {
        AppBuilder::new()
            .context(Context::in_memory())
            .dataset(Arc::new(StaticDataset::default()))
    }

    #[test]
    fn build_success() {
        let app = complete()
            .with_builtin_tasks()
            .unwrap()
            .expect_tasks(&[job_types::HISTOGRAM, job_types::LINE])
            .build()
            .unwrap();
        assert_eq!(app.registry().registered_types(), vec!["histogram", "line"]);
    }

    #[test]
    fn build_missing_task_types() {
        let app = complete()
            .expect_tasks(&[job_types::HISTOGRAM, "pie"])
            .build();
        assert!(matches!(
            app,
            Err(BuildError::MissingTaskTypes(missing))
                if missing == vec!["histogram".to_string(), "pie".to_string()]
        ));
    }

    #[test]
    fn build_without_expect_tasks() {
        assert!(complete().build().is_ok());
    }

    #[test]
    fn build_missing_components() {
        let no_context = AppBuilder::new()
            .dataset(Arc::new(StaticDataset::default()))
            .build();
        assert!(matches!(
            no_context,
            Err(BuildError::MissingComponent("context"))
        ));

        let no_dataset = AppBuilder::new().context(Context::in_memory()).build();
        assert!(matches!(
            no_dataset,
            Err(BuildError::MissingComponent("dataset"))
        ));
    }

    #[test]
    fn double_builtin_registration_fails() {
        let result = complete()
            .with_builtin_tasks()
            .unwrap()
            .with_builtin_tasks();
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn config_sets_worker_settings() {
        let config = PipelineConfig {
            poll_interval_ms: 50,
            ..PipelineConfig::default()
        };
        let app = complete().with_config(&config).build().unwrap();
        assert_eq!(app.poll_interval, Duration::from_millis(50));
        assert_eq!(app.backoff, Backoff::from(&config.retry));
    }
}
