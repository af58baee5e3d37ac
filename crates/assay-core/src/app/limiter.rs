//! LimitedAnalyzer - Analyzer を semaphore の下で blocking pool に逃がす
//!
//! # 設計原則
//! - permit 数は設定値（既定 1 = プロセス全体で直列）
//! - permit は blocking 呼び出しが実際に終わるまで保持する
//!   （timeout で待つのをやめても、裏で走っている計算は止まらないため）
//! - Analyzer の panic は `AnalyzeError::Crashed` として返す

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::domain::{AnalyzeError, ArtifactRef};
use crate::ports::Analyzer;

#[derive(Clone)]
pub struct LimitedAnalyzer {
    analyzer: Arc<dyn Analyzer>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl LimitedAnalyzer {
    /// `permits` は最低 1 に丸める
    pub fn new(analyzer: Arc<dyn Analyzer>, permits: usize) -> Self {
        Self {
            analyzer,
            permits: Arc::new(Semaphore::new(permits.max(1))),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn analyze(&self, artifact: &ArtifactRef) -> Result<Value, AnalyzeError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AnalyzeError::Unavailable("analysis limiter closed".to_string()))?;

        let analyzer = Arc::clone(&self.analyzer);
        let artifact = artifact.clone();
        let call = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            analyzer.analyze(&artifact)
        });

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AnalyzeError::TimedOut(limit))?,
            None => call.await,
        };
        joined.map_err(crashed)?
    }
}

fn crashed(err: JoinError) -> AnalyzeError {
    match err.try_into_panic() {
        Ok(payload) => AnalyzeError::Crashed(super::processor::panic_message(payload.as_ref())),
        Err(err) => AnalyzeError::Crashed(err.to_string()),
    }
}
