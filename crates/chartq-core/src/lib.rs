//! chartq-core
//!
//! Asynchronous chart-job pipeline: submit a job, get an id back at once,
//! poll its status, fetch the rendered artifact when it completes.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job_type, status, job, artifact, dataset, errors）
//! - **ports**: 抽象化レイヤー（JobStore, JobQueue, ResultStore, DatasetSource, Clock, IdGenerator）
//! - **impls**: ports の実装（in-memory / file system / Redis / dataset sources）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TaskRegistry）
//! - **tasks**: 組み込み task body（histogram, line）と SVG 描画
//! - **app**: パイプラインの組み立て（context, builder, gateway, worker_loop）
//! - **config**: 設定（ワーカー数、リトライ、ストレージ、データセット）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod tasks;
pub mod typed;
