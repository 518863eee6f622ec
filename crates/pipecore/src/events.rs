use crate::task::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted during task runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    TaskStarted {
        run_id: RunId,
        task: String,
        timestamp: DateTime<Utc>,
    },
    RecordFailed {
        run_id: RunId,
        task: String,
        record_id: Option<String>,
        error: String,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        run_id: RunId,
        task: String,
        records_processed: u64,
        records_failed: u64,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        run_id: RunId,
        task: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    TaskStopped {
        run_id: RunId,
        task: String,
        records_processed: u64,
        timestamp: DateTime<Utc>,
    },
    StageMessage {
        run_id: RunId,
        task: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Run-scoped event emitter handed to the executor and stages
#[derive(Clone)]
pub struct RunEventEmitter {
    run_id: RunId,
    task: String,
    sender: broadcast::Sender<RunEvent>,
}

impl RunEventEmitter {
    pub fn new(run_id: RunId, task: impl Into<String>, sender: broadcast::Sender<RunEvent>) -> Self {
        Self {
            run_id,
            task: task.into(),
            sender,
        }
    }

    fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn started(&self) {
        self.emit(RunEvent::TaskStarted {
            run_id: self.run_id,
            task: self.task.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn record_failed(&self, record_id: Option<String>, error: impl Into<String>) {
        self.emit(RunEvent::RecordFailed {
            run_id: self.run_id,
            task: self.task.clone(),
            record_id,
            error: error.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn completed(&self, records_processed: u64, records_failed: u64) {
        self.emit(RunEvent::TaskCompleted {
            run_id: self.run_id,
            task: self.task.clone(),
            records_processed,
            records_failed,
            timestamp: Utc::now(),
        });
    }

    pub fn failed(&self, error: impl Into<String>) {
        self.emit(RunEvent::TaskFailed {
            run_id: self.run_id,
            task: self.task.clone(),
            error: error.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn stopped(&self, records_processed: u64) {
        self.emit(RunEvent::TaskStopped {
            run_id: self.run_id,
            task: self.task.clone(),
            records_processed,
            timestamp: Utc::now(),
        });
    }

    /// Free-form message from a stage (for operator visibility)
    pub fn message(&self, message: impl Into<String>) {
        self.emit(RunEvent::StageMessage {
            run_id: self.run_id,
            task: self.task.clone(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }
}

/// Global event bus for run events
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn emitter(&self, run_id: RunId, task: impl Into<String>) -> RunEventEmitter {
        RunEventEmitter::new(run_id, task, self.sender.clone())
    }
}
