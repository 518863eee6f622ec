use crate::error::StageError;
use crate::events::RunEventEmitter;
use crate::record::{ProcessedRecord, Record};
use crate::store::GraphStore;
use crate::task::RunId;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Capability contract a component implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Input,
    Processor,
    Output,
    Task,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Input => "input",
            Role::Processor => "processor",
            Role::Output => "output",
            Role::Task => "task",
        };
        f.write_str(name)
    }
}

/// A registered implementation class for one role.
///
/// Immutable once registered; the class name is unique within the role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub role: Role,
    pub class_name: String,
    pub display_name: String,
}

impl ComponentDescriptor {
    pub fn new(role: Role, class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            role,
            display_name: class_name.clone(),
            class_name,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

/// The `{name, class_name}` pair returned by create and list operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub name: String,
    pub class_name: String,
}

/// Lazy, finite sequence of records produced by an input source.
pub type RecordStream = BoxStream<'static, Result<Record, StageError>>;

/// Execution context handed to stages for one run.
#[derive(Clone)]
pub struct StageContext {
    /// Identifier of the run this stage is participating in
    pub run_id: RunId,

    /// The external store input and output stages read/write through
    pub store: Arc<dyn GraphStore>,

    /// Event emitter for run-scoped messages
    pub events: RunEventEmitter,

    /// Cancellation token observed between records
    pub cancellation: tokio_util::sync::CancellationToken,
}

/// Produces the records a run works through.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Class identifier this instance was created from
    fn class_name(&self) -> &str;

    /// Open the source and produce a lazy stream of records.
    ///
    /// Resource acquisition happens here; the returned stream owns any
    /// underlying cursor and releases it when dropped. Failure to open is
    /// a systemic fault for the run.
    async fn open(&self, ctx: StageContext) -> Result<RecordStream, StageError>;
}

/// Transforms one record into one processed result.
#[async_trait]
pub trait Processor: Send + Sync {
    fn class_name(&self) -> &str;

    /// Process a single record. A processor may fan work out internally,
    /// but must surface exactly one deterministic result (or error) per
    /// record.
    async fn process(
        &self,
        record: Record,
        ctx: &StageContext,
    ) -> Result<ProcessedRecord, StageError>;
}

/// Routes processed results to their side effect.
#[async_trait]
pub trait OutputSink: Send + Sync {
    fn class_name(&self) -> &str;

    /// Acquire any resources the sink needs for a run. Failure here is a
    /// systemic fault and aborts the run before any record is pulled.
    async fn prepare(&self, _ctx: &StageContext) -> Result<(), StageError> {
        Ok(())
    }

    /// Persist one processed record.
    async fn write(&self, record: ProcessedRecord, ctx: &StageContext) -> Result<(), StageError>;
}
