//! Task trait - 型付き Task の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (DeserializeOwned + Send + Sync + 'static)

use serde::de::DeserializeOwned;

/// Task は job_type と params の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Deserialize)]
/// struct PieTask {
///     field: String,
/// }
///
/// impl Task for PieTask {
///     const TYPE: &'static str = "pie";
/// }
/// ```
///
/// # Trait Bounds
/// - `DeserializeOwned`: ジョブの params（JSON object）から復元するため
/// - `Send + Sync`: 複数ワーカーから安全に使えるため
/// - `'static`: Arc に格納できるため（参照を持たない）
pub trait Task: DeserializeOwned + Send + Sync + 'static {
    /// The `job_type` string submissions use to select this task.
    const TYPE: &'static str;
}
