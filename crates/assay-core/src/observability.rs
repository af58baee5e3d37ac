use serde::{Deserialize, Serialize};

use crate::domain::{TaskRecord, TaskStatus};
use crate::ports::TaskStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a TaskRecord>) -> Self {
        let mut counts = TaskCounts::default();
        for record in records {
            match record.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub async fn snapshot(store: &dyn TaskStore) -> Self {
        Self::tally(store.list_tasks().await.values())
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }

    pub fn in_flight(&self) -> usize {
        self.pending + self.running
    }
}
