//! Typed - 型付き Task API
//!
//! job_type 文字列と task body の対応付けを型で表現します。
//! dispatch ループは job_type を知らず、registry に解決を任せます。
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait, `Handler<T>` trait - params を型として受け取る
//! - **内部（Dyn）**: `TaskBody` trait - object-safe, type erasure

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{Handler, TaskBody, TypedHandler};
pub use self::registry::{RegistryError, TaskRegistry};
pub use self::task::Task;
