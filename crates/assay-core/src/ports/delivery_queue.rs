//! DeliveryQueue port - 配送キュー
//!
//! DeliveryQueue は `QueueItem`（task_id + artifact 参照）のみを流します。
//! 状態は TaskStore が持ちます。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{EnqueueError, QueueError, QueueItem};

/// DeliveryQueue は Dispatcher と Worker Pool の間の唯一の受け渡し口
///
/// # 設計原則
/// - strict FIFO（1 インスタンス内）
/// - enqueue は consumer を待たない。失敗したら item を返す
/// - blocking dequeue（timeout 付き）
/// - 完了トラッカー: enqueue で +1、`task_done` で -1、`join` は 0 になるまで待つ
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue(&self, item: QueueItem) -> Result<(), EnqueueError>;

    /// 最大 `wait` だけ待つ。timeout なら `Ok(None)`
    async fn dequeue(&self, wait: Duration) -> Result<Option<QueueItem>, QueueError>;

    /// dequeue した 1 件を完了にする
    async fn task_done(&self) -> Result<(), QueueError>;

    /// enqueue された item がすべて完了するまで待つ
    async fn join(&self);

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
