//! Domain model (ids, task records, queue items, errors).

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod state;
pub mod task;

pub use self::envelope::{ArtifactRef, QueueItem, Upload};
pub use self::errors::{
    AnalyzeError, ArtifactError, DispatchError, EnqueueError, QueueError, StoreError,
    UnknownStatus,
};
pub use self::ids::TaskId;
pub use self::state::TaskStatus;
pub use self::task::{StatusUpdate, TaskMeta, TaskRecord};
