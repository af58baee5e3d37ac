//! Status - 呼び出し側に見せるステータス
//!
//! `{"status": "pending"}` / `{"status": "completed", "data": ...}` / `{"status": "failed", "detail": "..."}`
//!
//! 保存された status 文字列が読めなくても、エラーにはせず `unknown` として返します。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{TaskRecord, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusView {
    Pending,
    Running,
    Completed { data: Value },
    Failed { detail: String },
    /// 保存されたステータスを解釈できなかった
    Unknown { detail: String },
}

impl StatusView {
    pub fn from_record(record: &TaskRecord) -> Self {
        match record.status {
            TaskStatus::Pending => StatusView::Pending,
            TaskStatus::Running => StatusView::Running,
            TaskStatus::Completed => StatusView::Completed {
                data: record.result.clone().unwrap_or(Value::Null),
            },
            TaskStatus::Failed => StatusView::Failed {
                detail: record
                    .detail
                    .clone()
                    .or_else(|| record.last_error.clone())
                    .unwrap_or_default(),
            },
        }
    }

    /// 型の緩いフィールド（別バックエンドの行など）から組み立てる
    pub fn from_raw(status: &str, data: Option<Value>, detail: Option<String>) -> Self {
        match status.parse::<TaskStatus>() {
            Ok(TaskStatus::Pending) => StatusView::Pending,
            Ok(TaskStatus::Running) => StatusView::Running,
            Ok(TaskStatus::Completed) => StatusView::Completed {
                data: data.unwrap_or(Value::Null),
            },
            Ok(TaskStatus::Failed) => StatusView::Failed {
                detail: detail.unwrap_or_default(),
            },
            Err(err) => StatusView::Unknown {
                detail: err.to_string(),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusView::Completed { .. } | StatusView::Failed { .. }
        )
    }
}

impl From<&TaskRecord> for StatusView {
    fn from(record: &TaskRecord) -> Self {
        Self::from_record(record)
    }
}
