//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Dispatcher**: 受け付け・staging・enqueue・fallback
//! - **WorkerPool**: キューを drain するワーカー群
//! - **AnalysisProcessor**: 1 件の処理（解析 → 結果保存 → artifact 削除）
//! - **LimitedAnalyzer**: semaphore 付きの解析呼び出し
//! - **CleanupLoop**: 古いタスクの定期削除
//! - **StatusView**: 呼び出し側に見せるステータス

pub mod builder;
pub mod dispatcher;
pub mod limiter;
pub mod maintenance;
pub mod processor;
pub mod status;
pub mod worker_pool;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError, RunningApp};
pub use self::dispatcher::{Dispatcher, Route, Submission, UploadPolicy};
pub use self::limiter::LimitedAnalyzer;
pub use self::maintenance::CleanupLoop;
pub use self::processor::{AnalysisProcessor, ProcessOutcome, TaskProcessor, run_guarded};
pub use self::status::StatusView;
pub use self::worker_pool::{ShutdownReport, WorkerPool};
