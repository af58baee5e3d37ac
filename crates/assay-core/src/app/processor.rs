//! Processing routine - 1 つの QueueItem を終端状態まで持っていく
//!
//! Worker Pool と fallback 実行はどちらもここを呼びます（契約は同じ）。
//!
//! # フロー
//! 1. dedup: タスクが無い / 既に終端 → Skipped
//! 2. `running` にする
//! 3. LimitedAnalyzer で解析
//! 4. 成功 → `save_task_result`、失敗 → `increment_retries` してから `failed`
//! 5. 何があっても staged artifact を消す

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::limiter::LimitedAnalyzer;
use crate::domain::{ArtifactRef, QueueItem, StatusUpdate, TaskId};
use crate::error::AssayError;
use crate::ports::{ArtifactStore, TaskStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Failed,
    /// タスクが無い（掃除済み）か既に終端。何もしていない
    Skipped,
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessOutcome::Completed => "completed",
            ProcessOutcome::Failed => "failed",
            ProcessOutcome::Skipped => "skipped",
        })
    }
}

/// TaskProcessor は dequeue した 1 件の処理方法（strategy）
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, item: QueueItem) -> Result<ProcessOutcome, AssayError>;
}

/// AnalysisProcessor は staged artifact を解析して結果を記録する本番用の実装
pub struct AnalysisProcessor {
    store: Arc<dyn TaskStore>,
    artifacts: Arc<dyn ArtifactStore>,
    analyzer: LimitedAnalyzer,
}

impl AnalysisProcessor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        artifacts: Arc<dyn ArtifactStore>,
        analyzer: LimitedAnalyzer,
    ) -> Self {
        Self {
            store,
            artifacts,
            analyzer,
        }
    }

    async fn run(&self, item: &QueueItem) -> Result<ProcessOutcome, AssayError> {
        let id = item.task_id.as_str();

        let Some(record) = self.store.get_task(id).await? else {
            warn!(task_id = %item.task_id, "task vanished before processing");
            return Ok(ProcessOutcome::Skipped);
        };
        if record.is_terminal() {
            debug!(task_id = %item.task_id, status = %record.status, "duplicate delivery, skipping");
            return Ok(ProcessOutcome::Skipped);
        }
        if !self
            .store
            .update_task_status(id, StatusUpdate::running())
            .await?
        {
            warn!(task_id = %item.task_id, "task vanished before processing");
            return Ok(ProcessOutcome::Skipped);
        }

        match self.analyzer.analyze(&item.artifact).await {
            Ok(result) => {
                self.store.save_task_result(id, result, None).await?;
                info!(task_id = %item.task_id, "analysis completed");
                Ok(ProcessOutcome::Completed)
            }
            Err(err) => {
                let reason = err.to_string();
                error!(task_id = %item.task_id, error = %reason, "analysis failed");
                self.record_failure(&item.task_id, reason).await?;
                Ok(ProcessOutcome::Failed)
            }
        }
    }

    /// retries を先に増やす。`failed` が見えた時点で retries は必ず反映済み
    async fn record_failure(&self, task_id: &TaskId, reason: String) -> Result<(), AssayError> {
        let id = task_id.as_str();
        match self.store.get_task(id).await? {
            Some(record) if !record.is_terminal() => {}
            _ => return Ok(()),
        }
        self.store.increment_retries(id).await?;
        self.store
            .update_task_status(id, StatusUpdate::failed(reason))
            .await?;
        Ok(())
    }

    async fn release(&self, artifact: &ArtifactRef) {
        match self.artifacts.remove(artifact).await {
            Ok(_) => {}
            Err(err) => {
                warn!(path = %artifact.path.display(), error = %err, "failed to remove staged artifact");
            }
        }
    }
}

#[async_trait]
impl TaskProcessor for AnalysisProcessor {
    async fn process(&self, item: QueueItem) -> Result<ProcessOutcome, AssayError> {
        let outcome = AssertUnwindSafe(self.run(&item)).catch_unwind().await;

        // the staged artifact goes away on every exit path
        self.release(&item.artifact).await;

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                // best effort: a task left running after a panic would never finish
                if let Err(err) = self
                    .record_failure(&item.task_id, format!("processing panicked: {message}"))
                    .await
                {
                    warn!(task_id = %item.task_id, error = %err, "could not record panic as failure");
                }
                Err(AssayError::Panicked(message))
            }
        }
    }
}

/// `processor` を実行し、エラーも panic もログに出して握りつぶす
///
/// ワーカーと fallback の両方から呼ぶ。どちらも 1 件の失敗で止まらない。
pub async fn run_guarded(
    processor: &dyn TaskProcessor,
    item: QueueItem,
    origin: &str,
) -> Option<ProcessOutcome> {
    let task_id = item.task_id.clone();
    match AssertUnwindSafe(processor.process(item)).catch_unwind().await {
        Ok(Ok(outcome)) => {
            debug!(task_id = %task_id, origin, %outcome, "processed");
            Some(outcome)
        }
        Ok(Err(err)) => {
            error!(task_id = %task_id, origin, error = %err, "processing failed");
            None
        }
        Err(payload) => {
            error!(
                task_id = %task_id,
                origin,
                panic = %panic_message(payload.as_ref()),
                "processor panicked"
            );
            None
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StoreError, TaskMeta, TaskRecord, TaskStatus, Upload};
    use crate::impls::{InMemoryTaskStore, LocalArtifactStore};
    use crate::testing::{RecordingProcessor, StubAnalyzer, png};
    use chrono::TimeDelta;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryTaskStore>,
        artifacts: Arc<LocalArtifactStore>,
        processor: AnalysisProcessor,
    }

    fn harness(analyzer: StubAnalyzer) -> Harness {
        harness_with(LimitedAnalyzer::new(Arc::new(analyzer), 1))
    }

    fn harness_with(analyzer: LimitedAnalyzer) -> Harness {
        let store = Arc::new(InMemoryTaskStore::new());
        let artifacts = Arc::new(LocalArtifactStore::temporary().unwrap());
        let processor = AnalysisProcessor::new(store.clone(), artifacts.clone(), analyzer);
        Harness {
            store,
            artifacts,
            processor,
        }
    }

    impl Harness {
        async fn staged(&self, upload: &Upload) -> QueueItem {
            let id = self
                .store
                .create_task(TaskMeta::for_upload(&upload.filename, &upload.content_type))
                .await
                .unwrap();
            let artifact = self.artifacts.stage(&id, upload).await.unwrap();
            QueueItem::new(id, artifact)
        }
    }

    #[tokio::test]
    async fn success_completes_and_removes_artifact() {
        let h = harness(StubAnalyzer::succeeding(json!({"label": "cat"})));
        let item = h.staged(&png("cat.png")).await;
        let (id, artifact) = (item.task_id.clone(), item.artifact.clone());

        let outcome = h.processor.process(item).await.unwrap();

        assert_eq!(outcome, ProcessOutcome::Completed);
        let record = h.store.get_task(id.as_str()).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result, Some(json!({"label": "cat"})));
        assert_eq!(record.retries, 0);
        assert!(!h.artifacts.exists(&artifact).await);
    }

    #[tokio::test]
    async fn failure_records_error_and_bumps_retries() {
        let h = harness(StubAnalyzer::failing("hazard index unreachable"));
        let item = h.staged(&png("dog.png")).await;
        let (id, artifact) = (item.task_id.clone(), item.artifact.clone());

        let outcome = h.processor.process(item).await.unwrap();

        assert_eq!(outcome, ProcessOutcome::Failed);
        let record = h.store.get_task(id.as_str()).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.retries, 1);
        assert!(
            record
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("hazard index unreachable"))
        );
        assert_eq!(record.detail, record.last_error);
        assert!(!h.artifacts.exists(&artifact).await);
    }

    /// increment_retries の前に待ちを入れて、書き込みの間を観測しやすくするストア
    struct SlowRetryStore {
        inner: InMemoryTaskStore,
        delay: Duration,
    }

    #[async_trait]
    impl TaskStore for SlowRetryStore {
        async fn create_task(&self, meta: TaskMeta) -> Result<TaskId, StoreError> {
            self.inner.create_task(meta).await
        }

        async fn get_task(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
            self.inner.get_task(id).await
        }

        async fn update_task_status(
            &self,
            id: &str,
            update: StatusUpdate,
        ) -> Result<bool, StoreError> {
            self.inner.update_task_status(id, update).await
        }

        async fn increment_retries(&self, id: &str) -> Result<i64, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.increment_retries(id).await
        }

        async fn list_tasks(&self) -> HashMap<TaskId, TaskRecord> {
            self.inner.list_tasks().await
        }

        async fn cleanup_tasks(&self, max_age: TimeDelta) -> Result<usize, StoreError> {
            self.inner.cleanup_tasks(max_age).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_is_never_visible_before_its_retry() {
        let store = Arc::new(SlowRetryStore {
            inner: InMemoryTaskStore::new(),
            delay: Duration::from_millis(50),
        });
        let artifacts = Arc::new(LocalArtifactStore::temporary().unwrap());
        let processor = AnalysisProcessor::new(
            store.clone(),
            artifacts.clone(),
            LimitedAnalyzer::new(Arc::new(StubAnalyzer::failing("model offline")), 1),
        );
        let upload = png("late.png");
        let id = store
            .create_task(TaskMeta::for_upload(&upload.filename, &upload.content_type))
            .await
            .unwrap();
        let artifact = artifacts.stage(&id, &upload).await.unwrap();

        let handle = tokio::spawn(async move {
            processor.process(QueueItem::new(id.clone(), artifact)).await.unwrap();
            id
        });

        let mut first_failed = None;
        while first_failed.is_none() && !handle.is_finished() {
            for record in store.list_tasks().await.into_values() {
                if record.status == TaskStatus::Failed {
                    first_failed = Some(record.retries);
                }
            }
            tokio::task::yield_now().await;
        }
        let id = handle.await.unwrap();
        let record = store.get_task(id.as_str()).await.unwrap().unwrap();

        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.retries, 1);
        if let Some(retries) = first_failed {
            assert_eq!(retries, 1);
        }
    }

    #[tokio::test]
    async fn analyzer_panic_is_a_failure_not_a_crash() {
        let h = harness(StubAnalyzer::panicking("segfault-ish"));
        let item = h.staged(&png("x.png")).await;
        let (id, artifact) = (item.task_id.clone(), item.artifact.clone());

        let outcome = h.processor.process(item).await.unwrap();

        assert_eq!(outcome, ProcessOutcome::Failed);
        let record = h.store.get_task(id.as_str()).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(!h.artifacts.exists(&artifact).await);
    }

    #[tokio::test]
    async fn timeout_marks_failed() {
        let analyzer = LimitedAnalyzer::new(
            Arc::new(StubAnalyzer::slow(Duration::from_millis(300))),
            1,
        )
        .with_timeout(Some(Duration::from_millis(20)));
        let h = harness_with(analyzer);
        let item = h.staged(&png("slow.png")).await;
        let id = item.task_id.clone();

        let outcome = h.processor.process(item).await.unwrap();

        assert_eq!(outcome, ProcessOutcome::Failed);
        let record = h.store.get_task(id.as_str()).await.unwrap().unwrap();
        assert!(
            record
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("timed out"))
        );
    }

    #[tokio::test]
    async fn duplicate_delivery_is_skipped() {
        let stub = Arc::new(StubAnalyzer::succeeding(json!(1)));
        let h = harness_with(LimitedAnalyzer::new(stub.clone(), 1));
        let item = h.staged(&png("a.png")).await;
        let duplicate = QueueItem::new(item.task_id.clone(), item.artifact.clone());

        assert_eq!(h.processor.process(item).await.unwrap(), ProcessOutcome::Completed);
        assert_eq!(
            h.processor.process(duplicate).await.unwrap(),
            ProcessOutcome::Skipped
        );
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn vanished_task_is_skipped_and_artifact_released() {
        let h = harness(StubAnalyzer::succeeding(json!(1)));
        let upload = png("gone.png");
        let id = TaskId::parse("task-gone").unwrap();
        let artifact = h.artifacts.stage(&id, &upload).await.unwrap();

        let outcome = h
            .processor
            .process(QueueItem::new(id, artifact.clone()))
            .await
            .unwrap();

        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert!(!h.artifacts.exists(&artifact).await);
    }

    #[tokio::test]
    async fn already_removed_artifact_is_fine() {
        let h = harness(StubAnalyzer::succeeding(json!(1)));
        let item = h.staged(&png("a.png")).await;
        h.artifacts.remove(&item.artifact).await.unwrap();

        // the stub never reads the file, so analysis still succeeds
        let outcome = h.processor.process(item).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Completed);
    }

    #[tokio::test]
    async fn run_guarded_swallows_panics() {
        let processor = RecordingProcessor::panicking_once();
        let h = harness(StubAnalyzer::succeeding(json!(1)));

        let first = run_guarded(&processor, h.staged(&png("a.png")).await, "test").await;
        let second = run_guarded(&processor, h.staged(&png("b.png")).await, "test").await;

        assert_eq!(first, None);
        assert_eq!(second, Some(ProcessOutcome::Completed));
        assert_eq!(processor.seen().len(), 2);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
