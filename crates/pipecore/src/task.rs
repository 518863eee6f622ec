use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RunId = Uuid;

/// Named binding of one input, one processor and one output instance.
///
/// The refs are instance names, not owned objects; they must resolve in
/// the instance registry when the task is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBinding {
    pub input: String,
    pub processor: String,
    pub output: String,
    pub sync: bool,
}

/// A created task. The definition outlives any number of runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    pub class_name: String,
    pub binding: TaskBinding,
}

/// Lifecycle state of a task's current or most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Stopped
        )
    }
}

/// State and counters for one run of a task.
///
/// A non-zero `records_failed` on a `Completed` run is partial success,
/// surfaced through the counters rather than a distinct state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: TaskState,
    pub records_processed: u64,
    pub records_failed: u64,
    pub last_error: Option<String>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            state: TaskState::Created,
            records_processed: 0,
            records_failed: 0,
            last_error: None,
        }
    }
}

/// One task as reported by the task list operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub name: String,
    pub class_name: String,
    pub status: RunStatus,
}
