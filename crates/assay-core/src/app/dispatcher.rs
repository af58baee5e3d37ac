//! Dispatcher - 受け付け → タスク作成 → staging → enqueue（失敗したら fallback）
//!
//! # 保証
//! - 受け付けたアップロードは、queue か fallback のどちらかで必ず 1 回実行される
//! - enqueue の失敗は呼び出し側に見せない（ログだけ）
//! - 呼び出し側に返るのは enqueue より前の失敗（Rejected / Store / Staging）のみ

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::processor::{TaskProcessor, run_guarded};
use super::status::StatusView;
use crate::domain::{DispatchError, EnqueueError, QueueItem, TaskId, TaskMeta, Upload};
use crate::ports::{ArtifactStore, DeliveryQueue, TaskStore};

/// UploadPolicy はタスク作成前に確認する受け付け条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub content_type_prefix: String,
}

impl UploadPolicy {
    pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

    /// 何でも受け付ける
    pub fn permissive() -> Self {
        Self {
            max_bytes: usize::MAX,
            content_type_prefix: String::new(),
        }
    }

    pub fn check(&self, upload: &Upload) -> Result<(), DispatchError> {
        if !upload.content_type.starts_with(&self.content_type_prefix) {
            return Err(DispatchError::Rejected(format!(
                "content type {:?} is not {}*",
                upload.content_type, self.content_type_prefix
            )));
        }
        if upload.len() > self.max_bytes {
            return Err(DispatchError::Rejected(format!(
                "upload is {} bytes, limit is {}",
                upload.len(),
                self.max_bytes
            )));
        }
        Ok(())
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: Self::DEFAULT_MAX_BYTES,
            content_type_prefix: "image/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Queued,
    Fallback,
}

/// 受け付け済みの submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub task_id: TaskId,
    pub route: Route,
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn DeliveryQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    processor: Arc<dyn TaskProcessor>,
    policy: UploadPolicy,
    fallbacks: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn DeliveryQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        processor: Arc<dyn TaskProcessor>,
    ) -> Self {
        Self {
            store,
            queue,
            artifacts,
            processor,
            policy: UploadPolicy::default(),
            fallbacks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn submit(&self, upload: Upload) -> Result<Submission, DispatchError> {
        self.policy.check(&upload)?;

        let task_id = self
            .store
            .create_task(TaskMeta::for_upload(&upload.filename, &upload.content_type))
            .await?;

        // the task stays pending if this fails; the maintenance sweep removes it later
        let artifact = self
            .artifacts
            .stage(&task_id, &upload)
            .await
            .map_err(|source| DispatchError::Staging {
                task_id: task_id.clone(),
                source,
            })?;

        let route = match self.queue.enqueue(QueueItem::new(task_id.clone(), artifact)).await {
            Ok(()) => Route::Queued,
            Err(EnqueueError { item, reason }) => {
                if reason.is_degraded() {
                    warn!(task_id = %task_id, error = %reason, "queue degraded, running task in background");
                } else {
                    error!(task_id = %task_id, error = %reason, "enqueue failed, running task in background");
                }
                self.spawn_fallback(item).await;
                Route::Fallback
            }
        };

        info!(task_id = %task_id, ?route, bytes = upload.len(), "submission accepted");
        Ok(Submission { task_id, route })
    }

    /// `item` をこの場で処理する（契約はワーカーと同じ）
    pub async fn run_inline(&self, item: QueueItem) {
        run_guarded(self.processor.as_ref(), item, "fallback").await;
    }

    async fn spawn_fallback(&self, item: QueueItem) {
        let processor = Arc::clone(&self.processor);
        let mut fallbacks = self.fallbacks.lock().await;
        // reap finished ones so the set does not grow forever
        while fallbacks.try_join_next().is_some() {}
        fallbacks.spawn(async move {
            run_guarded(processor.as_ref(), item, "fallback").await;
        });
    }

    pub async fn pending_fallbacks(&self) -> usize {
        self.fallbacks.lock().await.len()
    }

    /// これまでに spawn した fallback をすべて待つ
    pub async fn wait_for_fallbacks(&self) {
        let mut fallbacks = std::mem::take(&mut *self.fallbacks.lock().await);
        while let Some(joined) = fallbacks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "fallback task did not finish");
            }
        }
    }

    /// 呼び出し側向けのステータス。知らない id は `Ok(None)`
    pub async fn status(&self, id: &str) -> Result<Option<StatusView>, DispatchError> {
        let record = self.store.get_task(id).await?;
        Ok(record.as_ref().map(StatusView::from_record))
    }
}
