//! assay-core
//!
//! Asynchronous orchestration for artifact analysis: uploads become tasks, tasks flow
//! through an in-process queue to a worker pool, and callers poll for the result.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskId, TaskStatus, TaskRecord, QueueItem, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, DeliveryQueue, ArtifactStore, Analyzer, Clock, IdGenerator）
//! - **impls**: プロセス内の実装（InMemoryTaskStore, InMemoryDeliveryQueue, LocalArtifactStore）
//! - **app**: アプリケーションロジック（builder, dispatcher, worker_pool, processor, limiter, maintenance, status）
//! - **config**: TOML 設定
//! - **observability**: ステータス別の件数
//!
//! ログは `tracing` で出すだけで、subscriber のインストールはバイナリ側の責任です。

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;

#[cfg(test)]
mod testing;

pub use app::{AppBuilder, Dispatcher, StatusView, WorkerPool};
pub use config::AssayConfig;
pub use error::AssayError;
