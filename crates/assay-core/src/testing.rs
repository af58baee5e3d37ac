//! Test doubles shared by the unit tests.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::app::processor::{ProcessOutcome, TaskProcessor};
use crate::domain::{
    AnalyzeError, ArtifactRef, EnqueueError, QueueError, QueueItem, TaskId, TaskRecord, Upload,
};
use crate::error::AssayError;
use crate::ports::{Analyzer, DeliveryQueue, TaskStore};

enum Script {
    Succeed(Value),
    Fail(String),
    Panic(String),
    Sleep(Duration),
}

/// Scripted analyzer. Counts calls and the peak number of overlapping calls.
pub struct StubAnalyzer {
    script: Script,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl StubAnalyzer {
    fn scripted(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(result: Value) -> Self {
        Self::scripted(Script::Succeed(result))
    }

    /// Fails with `AnalyzeError::Lookup(message)`.
    pub fn failing(message: &str) -> Self {
        Self::scripted(Script::Fail(message.to_string()))
    }

    pub fn panicking(message: &str) -> Self {
        Self::scripted(Script::Panic(message.to_string()))
    }

    /// Sleeps on the calling (blocking) thread, then succeeds with the file name.
    pub fn slow(delay: Duration) -> Self {
        Self::scripted(Script::Sleep(delay))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

impl Analyzer for StubAnalyzer {
    fn analyze(&self, artifact: &ArtifactRef) -> Result<Value, AnalyzeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        let result = match &self.script {
            Script::Succeed(value) => Ok(value.clone()),
            Script::Fail(message) => Err(AnalyzeError::Lookup(message.clone())),
            Script::Panic(message) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("{message}");
            }
            Script::Sleep(delay) => {
                std::thread::sleep(*delay);
                Ok(json!({"filename": artifact.filename}))
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Records the ids it sees. Optionally sleeps or panics on the first item.
pub struct RecordingProcessor {
    seen: Mutex<Vec<TaskId>>,
    delay: Option<Duration>,
    panic_next: AtomicBool,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            delay: None,
            panic_next: AtomicBool::new(false),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn panicking_once() -> Self {
        Self {
            panic_next: AtomicBool::new(true),
            ..Self::new()
        }
    }

    pub fn seen(&self) -> Vec<TaskId> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskProcessor for RecordingProcessor {
    async fn process(&self, item: QueueItem) -> Result<ProcessOutcome, AssayError> {
        self.seen.lock().unwrap().push(item.task_id.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted processor panic for {}", item.task_id);
        }
        Ok(ProcessOutcome::Completed)
    }
}

/// A queue whose enqueue always fails with `Unavailable`.
#[derive(Default)]
pub struct RejectingQueue {
    attempts: AtomicUsize,
}

impl RejectingQueue {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryQueue for RejectingQueue {
    async fn enqueue(&self, item: QueueItem) -> Result<(), EnqueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EnqueueError::new(
            item,
            QueueError::Unavailable("broker unreachable".to_string()),
        ))
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<QueueItem>, QueueError> {
        tokio::time::sleep(wait).await;
        Ok(None)
    }

    async fn task_done(&self) -> Result<(), QueueError> {
        Err(QueueError::Underflow)
    }

    async fn join(&self) {}

    async fn len(&self) -> usize {
        0
    }
}

pub fn png(filename: &str) -> Upload {
    Upload::new(filename, "image/png", b"\x89PNG\r\n\x1a\nfake".to_vec())
}

pub fn artifact_at(path: &str) -> ArtifactRef {
    ArtifactRef {
        path: PathBuf::from(path),
        filename: "upload.png".to_string(),
        content_type: "image/png".to_string(),
    }
}

/// An item pointing at a file that does not exist.
pub fn item_for(id: &str) -> QueueItem {
    QueueItem::new(
        TaskId::parse(id).unwrap(),
        artifact_at(&format!("/nonexistent/{id}.png")),
    )
}

/// Poll `id` until it reaches a terminal state.
pub async fn wait_terminal(store: &dyn TaskStore, id: &TaskId) -> TaskRecord {
    let poll = async {
        loop {
            if let Some(record) = store.get_task(id.as_str()).await.unwrap()
                && record.is_terminal()
            {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .unwrap_or_else(|_| panic!("task {id} never reached a terminal state"))
}
