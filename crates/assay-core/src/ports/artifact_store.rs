//! ArtifactStore port - アップロードされたバイト列の一時置き場
//!
//! 実装: `LocalArtifactStore`（ローカルディレクトリ）

use async_trait::async_trait;

use crate::domain::{ArtifactError, ArtifactRef, TaskId, Upload};

/// ArtifactStore は staged artifact を保存・削除する
///
/// # 設計原則
/// - 1 タスクにつき 1 ファイル
/// - 書き込み途中で失敗したら部分ファイルを残さない
/// - 削除は冪等（既に無ければ `Ok(false)`）
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn stage(&self, task_id: &TaskId, upload: &Upload) -> Result<ArtifactRef, ArtifactError>;

    async fn exists(&self, artifact: &ArtifactRef) -> bool;

    /// ファイルを消したら `Ok(true)`
    async fn remove(&self, artifact: &ArtifactRef) -> Result<bool, ArtifactError>;
}
