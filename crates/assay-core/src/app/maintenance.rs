//! CleanupLoop - 古いタスクの定期削除
//!
//! # フロー
//! 1. `interval` ごとに起きる
//! 2. `cleanup_tasks(max_age)` を呼ぶ（status は問わない）
//! 3. shutdown が来たら抜ける
//!
//! staging と enqueue の間で落ちて `pending` のまま残ったタスクも、ここでいずれ消える。

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::StoreError;
use crate::ports::TaskStore;

pub struct CleanupLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl CleanupLoop {
    pub fn spawn(store: Arc<dyn TaskStore>, every: Duration, max_age: TimeDelta) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            // interval() panics on zero
            let mut ticks = tokio::time::interval(every.max(Duration::from_millis(1)));
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately; nothing is old yet
            ticks.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticks.tick() => {
                        if let Err(err) = sweep(store.as_ref(), max_age).await {
                            warn!(error = %err, "cleanup sweep failed");
                        }
                    }
                }
            }
            debug!("cleanup loop stopped");
        });

        Self { shutdown_tx, join }
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.join.await {
            warn!(error = %err, "cleanup loop did not stop cleanly");
        }
    }
}

/// cleanup を 1 回だけ実行
pub async fn sweep(store: &dyn TaskStore, max_age: TimeDelta) -> Result<usize, StoreError> {
    let removed = store.cleanup_tasks(max_age).await?;
    if removed > 0 {
        info!(removed, "expired tasks cleaned up");
    }
    Ok(removed)
}
