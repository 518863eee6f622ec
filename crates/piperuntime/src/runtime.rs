use crate::executor::{StartOutcome, TaskExecutor};
use crate::instances::InstanceRegistry;
use crate::registry::CapabilityRegistry;
use crate::tasks::TaskManager;
use pipecore::config::ConfigMap;
use pipecore::{
    ComponentDescriptor, EventBus, GraphStore, InstanceInfo, PipelineError, RegistryError, Role,
    RunEvent, TaskBinding, TaskError, TaskSummary,
};
use std::sync::Arc;

/// Main entry point wiring the registries, task manager and executor
/// around one graph-store collaborator.
///
/// The methods here are the engine's logical operations; any procedure or
/// RPC surface is a thin layer over them and out of scope.
pub struct PipelineRuntime {
    registry: Arc<CapabilityRegistry>,
    instances: Arc<InstanceRegistry>,
    tasks: Arc<TaskManager>,
    executor: Arc<TaskExecutor>,
    events: Arc<EventBus>,
    store: Arc<dyn GraphStore>,
}

impl PipelineRuntime {
    /// Create a runtime with a pre-populated capability registry
    pub fn new(store: Arc<dyn GraphStore>, registry: CapabilityRegistry) -> Self {
        Self::with_config(store, registry, RuntimeConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn GraphStore>,
        registry: CapabilityRegistry,
        config: RuntimeConfig,
    ) -> Self {
        let events = Arc::new(EventBus::new(config.event_capacity));
        let executor = Arc::new(TaskExecutor::new(store.clone(), events.clone()));
        Self {
            registry: Arc::new(registry),
            instances: Arc::new(InstanceRegistry::new()),
            tasks: Arc::new(TaskManager::new()),
            executor,
            events,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Registered implementation classes for a role, registration order
    pub fn capability_list(&self, role: Role) -> Vec<ComponentDescriptor> {
        self.registry.list(role)
    }

    pub async fn create_input(
        &self,
        name: &str,
        class_name: &str,
        config: &ConfigMap,
    ) -> Result<InstanceInfo, PipelineError> {
        self.instances
            .create_input(&self.registry, name, class_name, config)
            .await
    }

    pub async fn create_processor(
        &self,
        name: &str,
        class_name: &str,
        config: &ConfigMap,
    ) -> Result<InstanceInfo, PipelineError> {
        self.instances
            .create_processor(&self.registry, name, class_name, config)
            .await
    }

    pub async fn create_output(
        &self,
        name: &str,
        class_name: &str,
        config: &ConfigMap,
    ) -> Result<InstanceInfo, PipelineError> {
        self.instances
            .create_output(&self.registry, name, class_name, config)
            .await
    }

    /// Instances of a role, creation order. For `Role::Task` this lists
    /// the created tasks, matching the component-instance shape.
    pub async fn list_instances(&self, role: Role) -> Vec<InstanceInfo> {
        match role {
            Role::Task => self
                .tasks
                .list()
                .await
                .into_iter()
                .map(|t| InstanceInfo {
                    name: t.name,
                    class_name: t.class_name,
                })
                .collect(),
            other => self.instances.list(other).await,
        }
    }

    /// Delete an instance. Fails with `InstanceInUse` while any task
    /// references it; delete the referencing task first.
    pub async fn delete_instance(&self, role: Role, name: &str) -> Result<(), PipelineError> {
        if let Some(task) = self.tasks.references(role, name).await {
            return Err(RegistryError::InstanceInUse {
                role,
                name: name.to_string(),
                task,
            }
            .into());
        }
        self.instances.delete(role, name).await?;
        Ok(())
    }

    pub async fn create_task(
        &self,
        name: &str,
        class_name: &str,
        binding: TaskBinding,
    ) -> Result<InstanceInfo, PipelineError> {
        self.tasks
            .create(&self.registry, &self.instances, name, class_name, binding)
            .await
    }

    /// Every created task with its current/most-recent run state and
    /// counters
    pub async fn list_tasks(&self) -> Vec<TaskSummary> {
        self.tasks.list().await
    }

    pub async fn delete_task(&self, name: &str) -> Result<(), TaskError> {
        self.tasks.delete(name).await
    }

    /// Start a run; sync tasks return their terminal status, async tasks
    /// an acknowledgment
    pub async fn start_task(&self, name: &str) -> Result<StartOutcome, TaskError> {
        self.executor.start(&self.tasks, &self.instances, name).await
    }

    /// Signal cancellation; returns whether a running run was signalled
    pub async fn stop_task(&self, name: &str) -> Result<bool, TaskError> {
        self.executor.stop(&self.tasks, name).await
    }

    /// Subscribe to run events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
        }
    }
}
