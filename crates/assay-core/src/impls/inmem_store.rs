//! InMemoryTaskStore - プロセス内の TaskStore 実装
//!
//! # 実装詳細
//! - HashMap<TaskId, TaskRecord> を 1 つの tokio Mutex で保護（reader/writer の区別なし）
//! - レコードはロックの外に clone して返す
//! - 時刻と ID は Clock / IdGenerator から取る（テストで差し替え可能）

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::TimeDelta;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{StatusUpdate, StoreError, TaskId, TaskMeta, TaskRecord};
use crate::ports::task_store::MISSING_TASK;
use crate::ports::{Clock, IdGenerator, SystemClock, TaskStore, UlidGenerator};

pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// タイムスタンプも ULID の時刻部分も `clock` から取る
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let ids = Box::new(UlidGenerator::new(Arc::clone(&clock)));
        Self::with_parts(clock, ids)
    }

    pub fn with_parts(clock: Arc<dyn Clock>, ids: Box<dyn IdGenerator>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            clock,
            ids,
        }
    }

    /// プロセス共有の既定インスタンス（初回利用時に作成）
    pub fn shared() -> Arc<InMemoryTaskStore> {
        static SHARED: OnceLock<Arc<InMemoryTaskStore>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(InMemoryTaskStore::new())))
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, meta: TaskMeta) -> Result<TaskId, StoreError> {
        let mut tasks = self.tasks.lock().await;
        let mut id = self.ids.generate_task_id();
        // ids are never reused; draw again on the (unlikely) collision
        while tasks.contains_key(&id) {
            id = self.ids.generate_task_id();
        }
        let record = TaskRecord::new(id.clone(), meta, self.clock.now());
        tasks.insert(id.clone(), record);
        Ok(id)
    }

    async fn get_task(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks.get(id).cloned())
    }

    async fn update_task_status(
        &self,
        id: &str,
        update: StatusUpdate,
    ) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.lock().await;
        let Some(record) = tasks.get_mut(id) else {
            return Ok(false);
        };
        record.apply(update, self.clock.now())?;
        Ok(true)
    }

    async fn increment_retries(&self, id: &str) -> Result<i64, StoreError> {
        let mut tasks = self.tasks.lock().await;
        Ok(match tasks.get_mut(id) {
            Some(record) => i64::from(record.bump_retries(self.clock.now())),
            None => MISSING_TASK,
        })
    }

    async fn list_tasks(&self) -> HashMap<TaskId, TaskRecord> {
        self.tasks.lock().await.clone()
    }

    async fn cleanup_tasks(&self, max_age: TimeDelta) -> Result<usize, StoreError> {
        if max_age < TimeDelta::zero() {
            return Err(StoreError::InvalidArgument(format!(
                "max_age must not be negative (got {max_age})"
            )));
        }
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            // nothing can be older than the start of representable time
            return Ok(0);
        };

        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, record| record.created_at >= cutoff);
        let removed = before - tasks.len();
        debug!(removed, %cutoff, "cleaned up tasks");
        Ok(removed)
    }
}
