//! TaskStore port - タスク状態の正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - 状態（TaskStatus）とその遷移
//! - 結果 / エラー
//! - リトライ回数（情報用）
//!
//! # 設計原則
//! - 各操作は独立したアトミックな単位（内部の map は外に出さない）
//! - Not found はエラーにしない（`None` / `false` / `-1` で返す）
//! - 任意の `&str` は検索キー（知らない id は absent 扱い）
//! - 不正な引数（負の max_age、不変条件を壊す更新）は `StoreError`

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde_json::Value;

use crate::domain::{StatusUpdate, StoreError, TaskId, TaskMeta, TaskRecord};

/// タスクが無いときに `increment_retries` が返す値
pub const MISSING_TASK: i64 = -1;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// `pending` のタスクを追加して、新しい id を返す
    async fn create_task(&self, meta: TaskMeta) -> Result<TaskId, StoreError>;

    /// 1 件のスナップショット（clone）
    async fn get_task(&self, id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// `update` をアトミックに適用。タスクが無ければ `Ok(false)`
    async fn update_task_status(&self, id: &str, update: StatusUpdate)
    -> Result<bool, StoreError>;

    /// 解析結果を記録する
    ///
    /// error が無い（または空文字）なら `result` で completed。
    /// それ以外は `last_error = detail = error` で failed になり、`result` は捨てる。
    async fn save_task_result(
        &self,
        id: &str,
        result: Value,
        error: Option<String>,
    ) -> Result<bool, StoreError> {
        let update = match error.filter(|e| !e.is_empty()) {
            Some(error) => StatusUpdate::failed(error),
            None => StatusUpdate::completed(result),
        };
        self.update_task_status(id, update).await
    }

    /// retries を 1 増やして新しい値を返す。タスクが無ければ `MISSING_TASK`
    async fn increment_retries(&self, id: &str) -> Result<i64, StoreError>;

    async fn list_tasks(&self) -> HashMap<TaskId, TaskRecord>;

    /// ステータスに関係なく、`max_age` より前に作られたタスクを消す
    async fn cleanup_tasks(&self, max_age: TimeDelta) -> Result<usize, StoreError>;
}
