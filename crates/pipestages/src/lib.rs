//! Built-in stage library
//!
//! Query-driven input, annotation processor and store-linking output,
//! plus the in-memory property-graph store used by tests and demos.

mod input;
mod memory;
mod output;
mod processor;

pub use input::{QueryInput, QueryInputFactory, QUERY_INPUT_CLASS};
pub use memory::MemoryGraph;
pub use output::{StoreLinkOutput, StoreLinkOutputFactory, STORE_LINK_OUTPUT_CLASS};
pub use processor::{AnnotationProcessor, AnnotationProcessorFactory, ANNOTATION_PROCESSOR_CLASS};

use pipecore::{ComponentDescriptor, RegistryError, Role};
use piperuntime::CapabilityRegistry;
use std::sync::Arc;

/// Class name of the built-in pipeline task
pub const TASK_CLASS: &str = "task.pipeline";

/// Register all built-in stage classes and the default task class
pub fn register_all(registry: &mut CapabilityRegistry) -> Result<(), RegistryError> {
    registry.register_input(Arc::new(QueryInputFactory))?;
    registry.register_processor(Arc::new(AnnotationProcessorFactory))?;
    registry.register_output(Arc::new(StoreLinkOutputFactory))?;
    registry.register_task_class(ComponentDescriptor::new(Role::Task, TASK_CLASS))?;
    Ok(())
}
