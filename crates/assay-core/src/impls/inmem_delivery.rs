//! InMemoryDeliveryQueue - プロセス内の配送キュー
//!
//! # 学習ポイント
//! - tokio Mutex + Notify による blocking dequeue（timeout 付き）
//! - 完了トラッカー（unfinished カウンタ）と `join`
//! - bounded / close による「劣化した」キューの表現

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::domain::{EnqueueError, QueueError, QueueItem};
use crate::ports::DeliveryQueue;

struct QueueState {
    items: VecDeque<QueueItem>,
    /// enqueued but not yet `task_done`
    unfinished: usize,
    closed: bool,
}

/// InMemoryDeliveryQueue は strict FIFO の MPMC キュー
///
/// # 実装詳細
/// - VecDeque<QueueItem> を tokio Mutex で保護
/// - `available`: enqueue 時に consumer を 1 つ起こす
/// - `drained`: unfinished が 0 になったら join 待ちを全部起こす
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryDeliveryQueue::new();
/// queue.enqueue(item).await?;
/// let item = queue.dequeue(Duration::from_secs(1)).await?;
/// queue.task_done().await?;
/// ```
pub struct InMemoryDeliveryQueue {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    available: Notify,
    drained: Notify,
}

impl InMemoryDeliveryQueue {
    /// 上限なしの InMemoryDeliveryQueue を作成
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// `capacity` 件たまったら拒否する InMemoryDeliveryQueue を作成
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
                closed: false,
            }),
            capacity,
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// プロセス共有の既定インスタンス（初回利用時に作成）
    pub fn shared() -> Arc<InMemoryDeliveryQueue> {
        static SHARED: OnceLock<Arc<InMemoryDeliveryQueue>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(InMemoryDeliveryQueue::new())))
    }

    /// 以降の enqueue をすべて拒否する。キュー内の item は dequeue できる
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
    }

    pub async fn unfinished(&self) -> usize {
        self.state.lock().await.unfinished
    }
}

impl Default for InMemoryDeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn enqueue(&self, item: QueueItem) -> Result<(), EnqueueError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(EnqueueError::new(item, QueueError::Closed));
            }
            if let Some(capacity) = self.capacity
                && state.items.len() >= capacity
            {
                return Err(EnqueueError::new(item, QueueError::Full { capacity }));
            }
            state.items.push_back(item);
            state.unfinished += 1;
        }
        // notify_one stores a permit if nobody is waiting yet
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<QueueItem>, QueueError> {
        let next = async {
            loop {
                if let Some(item) = self.state.lock().await.items.pop_front() {
                    return item;
                }
                self.available.notified().await;
            }
        };
        match tokio::time::timeout(wait, next).await {
            Ok(item) => {
                // pass the wakeup on if more items are waiting
                if !self.state.lock().await.items.is_empty() {
                    self.available.notify_one();
                }
                Ok(Some(item))
            }
            Err(_elapsed) => Ok(None),
        }
    }

    async fn task_done(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.unfinished == 0 {
            return Err(QueueError::Underflow);
        }
        state.unfinished -= 1;
        if state.unfinished == 0 {
            self.drained.notify_waiters();
        }
        Ok(())
    }

    async fn join(&self) {
        loop {
            // register before checking so a concurrent notify_waiters is not missed
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            if self.state.lock().await.unfinished == 0 {
                return;
            }
            drained.await;
        }
    }

    async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }
}
