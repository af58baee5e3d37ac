//! Envelope - 配送用のデータ
//!
//! Queue を流れるのは `QueueItem`（task_id + staged artifact への参照）だけです。
//! 状態は TaskStore、バイト列は ArtifactStore が持ちます。

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::TaskId;

/// ArtifactRef は staged artifact のパスと、クライアントが申告した情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
}

impl ArtifactRef {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// QueueItem は Dispatcher から処理側への一時的な受け渡し
///
/// `Clone` しない。item（と staged artifact を消す権利）の所有者は常に 1 つ。
/// enqueue に失敗したら item は返ってくる。
#[derive(Debug, PartialEq, Eq)]
pub struct QueueItem {
    pub task_id: TaskId,
    pub artifact: ArtifactRef,
}

impl QueueItem {
    pub fn new(task_id: TaskId, artifact: ArtifactRef) -> Self {
        Self { task_id, artifact }
    }
}

/// Upload はクライアントから受け取った生のバイト列
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// 使える拡張子があれば小文字で返す
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| ext.to_ascii_lowercase())
    }
}

// bytes are elided; uploads can be megabytes
impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
