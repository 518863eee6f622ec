use crate::instances::InstanceRegistry;
use crate::registry::CapabilityRegistry;
use pipecore::{
    InstanceInfo, PipelineError, RegistryError, Role, RunStatus, TaskBinding, TaskDefinition,
    TaskError, TaskState, TaskSummary,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// One created task: its definition plus the state of its current or most
/// recent run.
///
/// Status updates are the sole responsibility of the executor; everything
/// else only reads snapshots.
pub struct TaskHandle {
    definition: TaskDefinition,
    status: Mutex<RunStatus>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl TaskHandle {
    fn new(definition: TaskDefinition) -> Self {
        Self {
            definition,
            status: Mutex::new(RunStatus::default()),
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the current run status
    pub async fn status(&self) -> RunStatus {
        self.status.lock().await.clone()
    }

    /// Claim the single run slot and reset counters for a fresh run.
    /// A task in any terminal state can be started again.
    pub(crate) async fn begin_run(&self) -> Result<CancellationToken, TaskError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TaskError::TaskAlreadyRunning(self.definition.name.clone()));
        }
        let token = CancellationToken::new();
        *self.cancel.lock().await = token.clone();
        let mut status = self.status.lock().await;
        *status = RunStatus {
            state: TaskState::Running,
            ..RunStatus::default()
        };
        Ok(token)
    }

    pub(crate) async fn record_processed(&self) {
        self.status.lock().await.records_processed += 1;
    }

    pub(crate) async fn record_failed(&self, error: &str) {
        let mut status = self.status.lock().await;
        status.records_failed += 1;
        status.last_error = Some(error.to_string());
    }

    /// Enter a terminal state and release the run slot. Returns the final
    /// status snapshot.
    pub(crate) async fn finish(&self, state: TaskState, error: Option<String>) -> RunStatus {
        let snapshot = {
            let mut status = self.status.lock().await;
            status.state = state;
            if error.is_some() {
                status.last_error = error;
            }
            status.clone()
        };
        self.running.store(false, Ordering::SeqCst);
        snapshot
    }

    /// Signal cooperative cancellation. Returns whether a running run was
    /// actually signalled.
    pub(crate) async fn signal_stop(&self) -> bool {
        if self.is_running() {
            self.cancel.lock().await.cancel();
            true
        } else {
            false
        }
    }
}

/// Binds instances into named tasks and tracks every task's run state.
pub struct TaskManager {
    tasks: RwLock<Vec<Arc<TaskHandle>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
        }
    }

    /// Validate and store a task definition.
    ///
    /// All three instance refs must resolve to existing instances of the
    /// expected role now; dangling refs are a creation-time error.
    pub async fn create(
        &self,
        registry: &CapabilityRegistry,
        instances: &InstanceRegistry,
        name: &str,
        class_name: &str,
        binding: TaskBinding,
    ) -> Result<InstanceInfo, PipelineError> {
        let mut tasks = self.tasks.write().await;
        if tasks.iter().any(|t| t.name() == name) {
            return Err(RegistryError::NameAlreadyExists {
                role: Role::Task,
                name: name.to_string(),
            }
            .into());
        }
        registry.task_class(class_name)?;
        instances.get_input(&binding.input).await?;
        instances.get_processor(&binding.processor).await?;
        instances.get_output(&binding.output).await?;

        tracing::info!(task = name, class = class_name, "created task");
        tasks.push(Arc::new(TaskHandle::new(TaskDefinition {
            name: name.to_string(),
            class_name: class_name.to_string(),
            binding,
        })));
        Ok(InstanceInfo {
            name: name.to_string(),
            class_name: class_name.to_string(),
        })
    }

    pub async fn get(&self, name: &str) -> Result<Arc<TaskHandle>, TaskError> {
        let tasks = self.tasks.read().await;
        tasks
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| TaskError::TaskNotFound(name.to_string()))
    }

    /// Every created task with its current/most-recent run state
    pub async fn list(&self) -> Vec<TaskSummary> {
        let tasks = self.tasks.read().await;
        let mut summaries = Vec::with_capacity(tasks.len());
        for task in tasks.iter() {
            summaries.push(TaskSummary {
                name: task.definition.name.clone(),
                class_name: task.definition.class_name.clone(),
                status: task.status().await,
            });
        }
        summaries
    }

    /// Remove a task definition, releasing its instance references.
    /// A running task cannot be deleted.
    pub async fn delete(&self, name: &str) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write().await;
        let position = tasks
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| TaskError::TaskNotFound(name.to_string()))?;
        if tasks[position].is_running() {
            return Err(TaskError::TaskAlreadyRunning(name.to_string()));
        }
        tasks.remove(position);
        tracing::info!(task = name, "deleted task");
        Ok(())
    }

    /// First task referencing the given instance, if any
    pub async fn references(&self, role: Role, instance_name: &str) -> Option<String> {
        let tasks = self.tasks.read().await;
        tasks
            .iter()
            .find(|t| {
                let binding = &t.definition.binding;
                match role {
                    Role::Input => binding.input == instance_name,
                    Role::Processor => binding.processor == instance_name,
                    Role::Output => binding.output == instance_name,
                    Role::Task => false,
                }
            })
            .map(|t| t.name().to_string())
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
