use crate::registry::CapabilityRegistry;
use pipecore::config::ConfigMap;
use pipecore::{
    InputSource, InstanceInfo, OutputSink, PipelineError, Processor, RegistryError, Role,
    StageError,
};
use std::sync::Arc;
use tokio::sync::RwLock;

struct InstanceEntry<T> {
    name: String,
    class_name: String,
    component: T,
}

struct Inner {
    inputs: Vec<InstanceEntry<Arc<dyn InputSource>>>,
    processors: Vec<InstanceEntry<Arc<dyn Processor>>>,
    outputs: Vec<InstanceEntry<Arc<dyn OutputSink>>>,
}

/// Holds the named, configured component instances.
///
/// The registry exclusively owns the instances; tasks reference them by
/// name only. Name checks and inserts happen under one write lock, so of
/// two racing creates with the same name exactly one wins.
pub struct InstanceRegistry {
    inner: RwLock<Inner>,
}

fn insert_entry<T>(
    entries: &mut Vec<InstanceEntry<T>>,
    role: Role,
    name: &str,
    class_name: &str,
    build: impl FnOnce() -> Result<T, StageError>,
) -> Result<InstanceInfo, PipelineError> {
    if entries.iter().any(|e| e.name == name) {
        return Err(RegistryError::NameAlreadyExists {
            role,
            name: name.to_string(),
        }
        .into());
    }
    let component = build()?;
    tracing::info!(role = %role, name, class = class_name, "created component instance");
    entries.push(InstanceEntry {
        name: name.to_string(),
        class_name: class_name.to_string(),
        component,
    });
    Ok(InstanceInfo {
        name: name.to_string(),
        class_name: class_name.to_string(),
    })
}

fn find_entry<T: Clone>(
    entries: &[InstanceEntry<T>],
    role: Role,
    name: &str,
) -> Result<T, RegistryError> {
    entries
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.component.clone())
        .ok_or_else(|| RegistryError::InstanceNotFound {
            role,
            name: name.to_string(),
        })
}

fn remove_entry<T>(
    entries: &mut Vec<InstanceEntry<T>>,
    role: Role,
    name: &str,
) -> Result<(), RegistryError> {
    let position = entries.iter().position(|e| e.name == name).ok_or_else(|| {
        RegistryError::InstanceNotFound {
            role,
            name: name.to_string(),
        }
    })?;
    entries.remove(position);
    tracing::info!(role = %role, name, "deleted component instance");
    Ok(())
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                inputs: Vec::new(),
                processors: Vec::new(),
                outputs: Vec::new(),
            }),
        }
    }

    pub async fn create_input(
        &self,
        registry: &CapabilityRegistry,
        name: &str,
        class_name: &str,
        config: &ConfigMap,
    ) -> Result<InstanceInfo, PipelineError> {
        let factory = registry.input_factory(class_name)?.clone();
        let mut inner = self.inner.write().await;
        insert_entry(&mut inner.inputs, Role::Input, name, class_name, || {
            factory.create(config)
        })
    }

    pub async fn create_processor(
        &self,
        registry: &CapabilityRegistry,
        name: &str,
        class_name: &str,
        config: &ConfigMap,
    ) -> Result<InstanceInfo, PipelineError> {
        let factory = registry.processor_factory(class_name)?.clone();
        let mut inner = self.inner.write().await;
        insert_entry(
            &mut inner.processors,
            Role::Processor,
            name,
            class_name,
            || factory.create(config),
        )
    }

    pub async fn create_output(
        &self,
        registry: &CapabilityRegistry,
        name: &str,
        class_name: &str,
        config: &ConfigMap,
    ) -> Result<InstanceInfo, PipelineError> {
        let factory = registry.output_factory(class_name)?.clone();
        let mut inner = self.inner.write().await;
        insert_entry(&mut inner.outputs, Role::Output, name, class_name, || {
            factory.create(config)
        })
    }

    pub async fn get_input(&self, name: &str) -> Result<Arc<dyn InputSource>, RegistryError> {
        let inner = self.inner.read().await;
        find_entry(&inner.inputs, Role::Input, name)
    }

    pub async fn get_processor(&self, name: &str) -> Result<Arc<dyn Processor>, RegistryError> {
        let inner = self.inner.read().await;
        find_entry(&inner.processors, Role::Processor, name)
    }

    pub async fn get_output(&self, name: &str) -> Result<Arc<dyn OutputSink>, RegistryError> {
        let inner = self.inner.read().await;
        find_entry(&inner.outputs, Role::Output, name)
    }

    /// All instances of a role, in creation order. `Role::Task` instances
    /// live in the task manager, not here.
    pub async fn list(&self, role: Role) -> Vec<InstanceInfo> {
        let inner = self.inner.read().await;
        fn infos<T>(entries: &[InstanceEntry<T>]) -> Vec<InstanceInfo> {
            entries
                .iter()
                .map(|e| InstanceInfo {
                    name: e.name.clone(),
                    class_name: e.class_name.clone(),
                })
                .collect()
        }
        match role {
            Role::Input => infos(&inner.inputs),
            Role::Processor => infos(&inner.processors),
            Role::Output => infos(&inner.outputs),
            Role::Task => Vec::new(),
        }
    }

    /// Remove an instance. Reference checks against existing tasks happen
    /// in the runtime facade before this is called.
    pub async fn delete(&self, role: Role, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        match role {
            Role::Input => remove_entry(&mut inner.inputs, role, name),
            Role::Processor => remove_entry(&mut inner.processors, role, name),
            Role::Output => remove_entry(&mut inner.outputs, role, name),
            Role::Task => Err(RegistryError::InstanceNotFound {
                role,
                name: name.to_string(),
            }),
        }
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
