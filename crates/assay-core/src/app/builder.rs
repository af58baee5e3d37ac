//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - プロセス全体の既定インスタンスはここでだけ使う（テストは自前のものを注入する）

use std::sync::Arc;

use chrono::TimeDelta;
use tokio::time::Instant;
use tracing::warn;

use super::dispatcher::Dispatcher;
use super::limiter::LimitedAnalyzer;
use super::maintenance::CleanupLoop;
use super::processor::{AnalysisProcessor, TaskProcessor};
use super::worker_pool::{ShutdownReport, WorkerPool};
use crate::config::{AssayConfig, ConfigError};
use crate::domain::ArtifactError;
use crate::impls::{InMemoryDeliveryQueue, InMemoryTaskStore, LocalArtifactStore};
use crate::ports::{Analyzer, ArtifactStore, DeliveryQueue, TaskStore};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .analyzer(Arc::new(MyAnalyzer))
///     .build()?;
/// let running = app.start();
/// running.dispatcher().submit(upload).await?;
/// running.shutdown().await;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に config を検証
/// - Analyzer も TaskProcessor も無ければ BuildError
/// - staging ディレクトリが作れなければ BuildError
pub struct AppBuilder {
    config: AssayConfig,
    analyzer: Option<Arc<dyn Analyzer>>,
    processor: Option<Arc<dyn TaskProcessor>>,
    store: Option<Arc<dyn TaskStore>>,
    queue: Option<Arc<dyn DeliveryQueue>>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    isolated: bool,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no analyzer configured; call .analyzer() or provide a custom .processor()")]
    MissingAnalyzer,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not prepare staging directory")]
    Staging(#[from] ArtifactError),
}

impl AppBuilder {
    pub fn new(config: AssayConfig) -> Self {
        Self {
            config,
            analyzer: None,
            processor: None,
            store: None,
            queue: None,
            artifacts: None,
            isolated: false,
        }
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// 既定の `AnalysisProcessor` を差し替える
    pub fn processor(mut self, processor: Arc<dyn TaskProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// プロセス共有のものではなく、新しい store / queue を作る
    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let task_ttl = self.config.maintenance.task_ttl()?;

        let store: Arc<dyn TaskStore> = match self.store {
            Some(store) => store,
            None if self.isolated => Arc::new(InMemoryTaskStore::new()),
            None => InMemoryTaskStore::shared(),
        };

        let queue: Arc<dyn DeliveryQueue> = match (self.queue, self.config.queue.capacity) {
            (Some(queue), _) => queue,
            (None, Some(capacity)) => Arc::new(InMemoryDeliveryQueue::bounded(capacity)),
            (None, None) if self.isolated => Arc::new(InMemoryDeliveryQueue::new()),
            (None, None) => InMemoryDeliveryQueue::shared(),
        };

        let artifacts: Arc<dyn ArtifactStore> = match (self.artifacts, &self.config.staging.dir) {
            (Some(artifacts), _) => artifacts,
            (None, Some(dir)) => Arc::new(LocalArtifactStore::open(dir)?),
            (None, None) => Arc::new(LocalArtifactStore::temporary()?),
        };

        let processor: Arc<dyn TaskProcessor> = match (self.processor, self.analyzer) {
            (Some(processor), _) => processor,
            (None, Some(analyzer)) => {
                let limited = LimitedAnalyzer::new(analyzer, self.config.analyzer.permits)
                    .with_timeout(self.config.analyzer.timeout());
                Arc::new(AnalysisProcessor::new(
                    Arc::clone(&store),
                    Arc::clone(&artifacts),
                    limited,
                ))
            }
            (None, None) => return Err(BuildError::MissingAnalyzer),
        };

        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&artifacts),
            Arc::clone(&processor),
        )
        .with_policy(self.config.upload_policy());

        Ok(App {
            config: self.config,
            task_ttl,
            store,
            queue,
            processor,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// App はワイヤリング済みで、まだバックグラウンド処理を始めていない状態
pub struct App {
    config: AssayConfig,
    task_ttl: TimeDelta,
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn DeliveryQueue>,
    processor: Arc<dyn TaskProcessor>,
    dispatcher: Arc<Dispatcher>,
}

impl App {
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// worker pool と cleanup loop を起動する（tokio runtime 上で呼ぶこと）
    pub fn start(self) -> RunningApp {
        let pool = WorkerPool::start(
            self.config.workers.count,
            self.config.workers.poll_interval(),
            Arc::clone(&self.queue),
            Arc::clone(&self.processor),
        );
        let cleanup = CleanupLoop::spawn(
            Arc::clone(&self.store),
            self.config.maintenance.interval(),
            self.task_ttl,
        );
        RunningApp {
            app: self,
            pool,
            cleanup,
        }
    }
}

pub struct RunningApp {
    app: App,
    pool: WorkerPool,
    cleanup: CleanupLoop,
}

impl RunningApp {
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        self.app.store()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.app.dispatcher()
    }

    pub fn workers(&self) -> usize {
        self.pool.len()
    }

    /// fallback を待ち、pool を drain して、cleanup loop を止める
    ///
    /// fallback の待ちと pool の drain は同じ deadline を共有する（合計で drain_timeout まで）
    pub async fn shutdown(self) -> ShutdownReport {
        let drain = self.app.config.workers.drain_timeout();
        let deadline = Instant::now() + drain;
        if tokio::time::timeout_at(deadline, self.app.dispatcher.wait_for_fallbacks())
            .await
            .is_err()
        {
            warn!(?drain, "fallback tasks still running at shutdown");
        }
        let report = self
            .pool
            .shutdown(deadline.saturating_duration_since(Instant::now()))
            .await;
        self.cleanup.stop().await;
        report
    }
}
