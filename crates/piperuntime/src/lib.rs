//! Pipeline orchestration runtime
//!
//! This crate provides the orchestration core: the capability registry
//! (class name → factory), the instance registry of named, configured
//! components, the task manager that binds instances into runnable tasks
//! and tracks run state, and the executor that streams records from an
//! input through a processor into an output.

mod executor;
mod instances;
mod registry;
mod runtime;
mod tasks;

pub use executor::{StartOutcome, TaskExecutor};
pub use instances::InstanceRegistry;
pub use registry::{CapabilityRegistry, InputFactory, OutputFactory, ProcessorFactory};
pub use runtime::{PipelineRuntime, RuntimeConfig};
pub use tasks::{TaskHandle, TaskManager};
