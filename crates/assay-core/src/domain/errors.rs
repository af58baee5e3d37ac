//! Errors - エラー型と分類
//!
//! # 分類
//! - 検証エラー（StoreError）: 呼び出し側のバグ。同期的に返す
//! - Not found: エラーにしない（`None` / `false` / `-1`）
//! - 配送エラー（QueueError / EnqueueError）: fallback 実行に切り替える
//! - 解析エラー（AnalyzeError）: processing 境界で捕まえて `failed` として記録する

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::{QueueItem, TaskId, TaskStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is full (capacity={capacity})")]
    Full { capacity: usize },

    #[error("queue is closed")]
    Closed,

    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("task_done() called more times than items were enqueued")]
    Underflow,
}

impl QueueError {
    /// full / closed は「劣化」であって故障ではない（ログレベルにだけ影響）
    pub fn is_degraded(&self) -> bool {
        matches!(self, QueueError::Full { .. } | QueueError::Closed)
    }
}

/// EnqueueError は拒否された enqueue。item を返すので所有権は呼び出し側に残る
#[derive(Debug, Error)]
#[error("enqueue of task {} failed: {reason}", .item.task_id)]
pub struct EnqueueError {
    pub item: QueueItem,
    #[source]
    pub reason: QueueError,
}

impl EnqueueError {
    pub fn new(item: QueueItem, reason: QueueError) -> Self {
        Self { item, reason }
    }

    pub fn into_parts(self) -> (QueueItem, QueueError) {
        (self.item, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact i/o failed at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("task id {0:?} cannot be used as an artifact name")]
    InvalidName(String),
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("reference lookup failed: {0}")]
    Lookup(String),

    #[error("artifact could not be read")]
    Io(#[from] io::Error),

    #[error("analysis timed out after {0:?}")]
    TimedOut(Duration),

    #[error("analyzer crashed: {0}")]
    Crashed(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("staging artifact for task {task_id} failed")]
    Staging {
        task_id: TaskId,
        #[source]
        source: ArtifactError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task status {0:?}")]
pub struct UnknownStatus(pub String);
