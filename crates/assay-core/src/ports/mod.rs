//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部のもの（状態の保存先、配送キュー、ファイル置き場、解析エンジン）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - TaskStore が source of truth（正本）
//! - DeliveryQueue は配送だけ（task_id + artifact 参照）
//! - ArtifactStore はバイト列の置き場
//! - Analyzer は不透明な計算（同期・CPU bound）

pub mod analyzer;
pub mod artifact_store;
pub mod clock;
pub mod delivery_queue;
pub mod id_generator;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::analyzer::Analyzer;
pub use self::artifact_store::ArtifactStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery_queue::DeliveryQueue;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{MISSING_TASK, TaskStore};
