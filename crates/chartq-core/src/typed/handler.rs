//! Handler trait - Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (TaskBody)
//! - Type erasure パターン (TypedHandler<T, H> → TaskBody)
//!
//! task body は純粋な計算（params + dataset → artifact）なので同期関数です。
//! ワーカーは blocking スレッドプール上で実行します。

use std::marker::PhantomData;

use serde_json::Value;

use super::task::Task;
use crate::domain::{Artifact, Params, Record, TaskError};

/// Handler は Task を実行して Artifact を返す
///
/// # 使用例
/// ```ignore
/// struct PieHandler;
///
/// impl Handler<PieTask> for PieHandler {
///     fn handle(&self, task: PieTask, dataset: &[Record]) -> Result<Artifact, TaskError> {
///         Ok(Artifact::svg(render_pie(&task.field, dataset)))
///     }
/// }
/// ```
///
/// # ジェネリクスによる型安全性
/// - `Handler<HistogramTask>` は `HistogramTask` しか受け取れない
/// - コンパイル時に Task と Handler の対応が保証される
pub trait Handler<T: Task>: Send + Sync {
    fn handle(&self, task: T, dataset: &[Record]) -> Result<Artifact, TaskError>;
}

/// TaskBody は object-safe な task body の抽象化
///
/// HashMap<String, Arc<dyn TaskBody>> に格納できるよう、
/// params は型消去された JSON object のまま受け取ります。
pub trait TaskBody: Send + Sync {
    fn job_type(&self) -> &str;

    fn run(&self, params: &Params, dataset: &[Record]) -> Result<Artifact, TaskError>;
}

/// Adapts a `Handler<T>` into a `TaskBody` by decoding params into `T`.
pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<T: Task, H: Handler<T>> TaskBody for TypedHandler<T, H> {
    fn job_type(&self) -> &str {
        T::TYPE
    }

    fn run(&self, params: &Params, dataset: &[Record]) -> Result<Artifact, TaskError> {
        let task: T = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| TaskError::InvalidParams(format!("{}: {e}", T::TYPE)))?;
        self.handler.handle(task, dataset)
    }
}
