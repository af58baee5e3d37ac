use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::processor::{TaskProcessor, run_guarded};
use crate::ports::DeliveryQueue;

/// ShutdownReport は `WorkerPool::shutdown` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// drain timeout までに queue の未完了数が 0 になった
    pub drained: bool,
    /// 強制キャンセルしたワーカー数
    pub aborted: usize,
}

/// WorkerPool はワーカー群のハンドル
/// - 各ワーカーは `poll_interval` ごとに dequeue を試す
/// - shutdown が立っていて queue が空なら抜ける
/// - `shutdown()` は drain を待ってから、残りを abort する
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    workers: JoinSet<()>,
    queue: Arc<dyn DeliveryQueue>,
}

impl WorkerPool {
    /// ワーカーを `n` 個起動する
    pub fn start(
        n: usize,
        poll_interval: Duration,
        queue: Arc<dyn DeliveryQueue>,
        processor: Arc<dyn TaskProcessor>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut workers = JoinSet::new();
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let p = Arc::clone(&processor);
            let rx = shutdown_rx.clone();
            workers.spawn(worker_loop(worker_id, poll_interval, q, p, rx));
        }
        info!(workers = n, "worker pool started");

        Self {
            shutdown_tx,
            workers,
            queue,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// queue が空になったら止まるよう伝える（待たない）
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// 2 段階の shutdown
    ///
    /// 1. シグナルを送り、`drain_timeout` まで queue の drain を待つ
    /// 2. まだ動いているものを abort して終了を待つ
    pub async fn shutdown(mut self, drain_timeout: Duration) -> ShutdownReport {
        self.request_shutdown();
        let deadline = Instant::now() + drain_timeout;

        let drained = tokio::time::timeout_at(deadline, self.queue.join())
            .await
            .is_ok();
        if !drained {
            warn!(?drain_timeout, "queue did not drain before timeout");
        }

        // idle workers notice the signal within one poll interval
        while !self.workers.is_empty() {
            match tokio::time::timeout_at(deadline, self.workers.join_next()).await {
                Ok(Some(Err(err))) if err.is_panic() => error!(error = %err, "worker panicked"),
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }

        let aborted = self.workers.len();
        if aborted > 0 {
            warn!(aborted, "aborting workers still running after drain timeout");
            self.workers.abort_all();
            while self.workers.join_next().await.is_some() {}
        }

        info!(drained, aborted, "worker pool stopped");
        ShutdownReport { drained, aborted }
    }
}

async fn worker_loop(
    worker_id: usize,
    poll_interval: Duration,
    queue: Arc<dyn DeliveryQueue>,
    processor: Arc<dyn TaskProcessor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker = worker_id, "worker started");
    let mut stopping = *shutdown_rx.borrow();

    loop {
        // dequeue は「待つ」ので、shutdown の変化と競合させる
        let polled = if stopping {
            queue.dequeue(Duration::ZERO).await
        } else {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // a dropped sender means nobody can call shutdown any more; stop too
                    stopping = changed.is_err() || *shutdown_rx.borrow();
                    continue;
                }
                polled = queue.dequeue(poll_interval) => polled,
            }
        };

        let item = match polled {
            Ok(Some(item)) => item,
            Ok(None) => {
                if stopping && queue.is_empty().await {
                    break;
                }
                continue;
            }
            Err(err) => {
                error!(worker = worker_id, error = %err, "dequeue failed");
                tokio::time::sleep(poll_interval).await;
                continue;
            }
        };

        debug!(worker = worker_id, task_id = %item.task_id, "dequeued");
        run_guarded(processor.as_ref(), item, "worker").await;

        if let Err(err) = queue.task_done().await {
            error!(worker = worker_id, error = %err, "task_done failed");
        }
    }

    debug!(worker = worker_id, "worker stopped");
}
