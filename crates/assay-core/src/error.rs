use thiserror::Error;

use crate::app::BuildError;
use crate::config::ConfigError;
use crate::domain::{AnalyzeError, ArtifactError, DispatchError, QueueError, StoreError};

#[derive(Debug, Error)]
pub enum AssayError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("processing panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}
