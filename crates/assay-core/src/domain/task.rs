//! Task record: metadata + lifecycle state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::StoreError;
use super::{TaskId, TaskStatus};

/// TaskMeta は submission のメタデータ。作成時に 1 度だけ設定し、以後は変更しない
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskMeta(BTreeMap<String, String>);

impl TaskMeta {
    pub const FILENAME: &'static str = "filename";
    pub const CONTENT_TYPE: &'static str = "content_type";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_upload(filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::new()
            .with(Self::FILENAME, filename)
            .with(Self::CONTENT_TYPE, content_type)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn filename(&self) -> Option<&str> {
        self.get(Self::FILENAME)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(Self::CONTENT_TYPE)
    }
}

/// TaskRecord は 1 タスクの正本
///
/// # 設計
/// - 所有者は store。呼び出し側が見るのは clone だけ
/// - 状態遷移はすべて `apply` を通る（ライフサイクル規則をここで強制）
/// - `result` は `completed` のときだけ、`last_error` は `failed` のときだけ存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
    pub input_meta: TaskMeta,

    pub result: Option<Value>,

    /// 現在の状態の説明（人が読む用）
    pub detail: Option<String>,

    pub last_error: Option<String>,

    /// 処理に失敗した回数（情報用）
    pub retries: u32,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: TaskId, input_meta: TaskMeta, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            input_meta,
            result: None,
            detail: None,
            last_error: None,
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 部分更新を適用する。全部反映されるか、何も変わらないかのどちらか
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> Result<(), StoreError> {
        let StatusUpdate {
            status,
            result,
            detail,
            last_error,
        } = update;

        if !self.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: status,
            });
        }
        if result.is_some() != (status == TaskStatus::Completed) {
            return Err(StoreError::InvalidArgument(format!(
                "a result must be given exactly when completing (status={status})"
            )));
        }
        if last_error.is_some() != (status == TaskStatus::Failed) {
            return Err(StoreError::InvalidArgument(format!(
                "an error must be given exactly when failing (status={status})"
            )));
        }

        match status {
            TaskStatus::Completed => {
                self.result = result;
                self.last_error = None;
            }
            TaskStatus::Failed => {
                self.last_error = last_error;
                self.result = None;
            }
            TaskStatus::Pending | TaskStatus::Running => {}
        }
        if let Some(detail) = detail {
            self.detail = Some(detail);
        }
        self.status = status;
        self.touch(now);
        Ok(())
    }

    pub fn bump_retries(&mut self, now: DateTime<Utc>) -> u32 {
        self.retries = self.retries.saturating_add(1);
        self.touch(now);
        self.retries
    }

    // updated_at never moves backwards, even if the clock does
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
    }
}

/// StatusUpdate は `TaskStore::update_task_status` 用の部分更新
/// `None` のフィールドは変更しない。
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub detail: Option<String>,
    pub last_error: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            result: None,
            detail: None,
            last_error: None,
        }
    }

    pub fn running() -> Self {
        Self::new(TaskStatus::Running)
    }

    pub fn completed(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::new(TaskStatus::Completed)
        }
    }

    /// ステータス表示で見えるよう、`detail` にも同じエラーを入れる
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            detail: Some(error.clone()),
            last_error: Some(error),
            ..Self::new(TaskStatus::Failed)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
