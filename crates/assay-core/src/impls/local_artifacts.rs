//! LocalArtifactStore - ローカルディレクトリに artifact を置く
//!
//! - `open(dir)`: 既存ディレクトリを使う（無ければ作る）
//! - `temporary()`: プロセスと寿命を共にする一時ディレクトリ（drop で消える）

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::domain::{ArtifactError, ArtifactRef, TaskId, Upload};
use crate::ports::ArtifactStore;

#[derive(Debug)]
pub struct LocalArtifactStore {
    root: PathBuf,
    // keeps the temp dir alive; dropped with the store
    _scratch: Option<TempDir>,
}

impl LocalArtifactStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = dir.into();
        std::fs::create_dir_all(&root).map_err(|source| ArtifactError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            _scratch: None,
        })
    }

    pub fn temporary() -> Result<Self, ArtifactError> {
        let scratch = tempfile::Builder::new()
            .prefix("assay-staging-")
            .tempdir()
            .map_err(|source| ArtifactError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        Ok(Self {
            root: scratch.path().to_path_buf(),
            _scratch: Some(scratch),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, task_id: &TaskId, upload: &Upload) -> Result<PathBuf, ArtifactError> {
        let id = task_id.as_str();
        if id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(ArtifactError::InvalidName(id.to_string()));
        }
        let name = match upload.extension() {
            Some(ext) => format!("{id}.{ext}"),
            None => id.to_string(),
        };
        Ok(self.root.join(name))
    }
}

async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn stage(&self, task_id: &TaskId, upload: &Upload) -> Result<ArtifactRef, ArtifactError> {
        let path = self.path_for(task_id, upload)?;

        if let Err(source) = write_new(&path, &upload.bytes).await {
            // an AlreadyExists file belongs to someone else; leave it alone
            if source.kind() != io::ErrorKind::AlreadyExists
                && let Err(cleanup) = fs::remove_file(&path).await
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %cleanup, "failed to remove partial artifact");
            }
            return Err(ArtifactError::Io { path, source });
        }

        Ok(ArtifactRef {
            path,
            filename: upload.filename.clone(),
            content_type: upload.content_type.clone(),
        })
    }

    async fn exists(&self, artifact: &ArtifactRef) -> bool {
        fs::try_exists(&artifact.path).await.unwrap_or(false)
    }

    async fn remove(&self, artifact: &ArtifactRef) -> Result<bool, ArtifactError> {
        match fs::remove_file(&artifact.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ArtifactError::Io {
                path: artifact.path.clone(),
                source,
            }),
        }
    }
}
