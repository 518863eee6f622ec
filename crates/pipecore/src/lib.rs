//! Core abstractions for the pipeflow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the value and record model, the three stage
//! contracts (input, processor, output), the graph-store collaborator
//! trait, task definitions and run state, and the run-event bus.

pub mod config;
mod error;
mod events;
mod record;
mod stage;
mod store;
mod task;
mod value;

pub use error::{PipelineError, RegistryError, StageError, StoreError, TaskError};
pub use events::{EventBus, RunEvent, RunEventEmitter};
pub use record::{ProcessedRecord, Record};
pub use stage::{
    ComponentDescriptor, InputSource, InstanceInfo, OutputSink, Processor, RecordStream, Role,
    StageContext,
};
pub use store::{GraphStore, Row};
pub use task::{RunId, RunStatus, TaskBinding, TaskDefinition, TaskState, TaskSummary};
pub use value::Value;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
