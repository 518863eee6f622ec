use pipecore::config::ConfigMap;
use pipecore::{
    ComponentDescriptor, InputSource, OutputSink, Processor, RegistryError, Role, StageError,
};
use std::sync::Arc;

/// Factory for input source instances.
///
/// Factories are the explicit replacement for class-name reflection:
/// every implementation registers one factory under its class name at
/// startup, and the registry maps name → factory from then on.
pub trait InputFactory: Send + Sync {
    /// Class identifier (e.g., "input.query")
    fn class_name(&self) -> &str;

    /// Construct a configured instance, validating the configuration
    /// eagerly.
    fn create(&self, config: &ConfigMap) -> Result<Arc<dyn InputSource>, StageError>;

    /// Human-readable label, defaults to the class name
    fn display_name(&self) -> &str {
        self.class_name()
    }
}

/// Factory for processor instances
pub trait ProcessorFactory: Send + Sync {
    fn class_name(&self) -> &str;

    fn create(&self, config: &ConfigMap) -> Result<Arc<dyn Processor>, StageError>;

    fn display_name(&self) -> &str {
        self.class_name()
    }
}

/// Factory for output sink instances
pub trait OutputFactory: Send + Sync {
    fn class_name(&self) -> &str;

    fn create(&self, config: &ConfigMap) -> Result<Arc<dyn OutputSink>, StageError>;

    fn display_name(&self) -> &str {
        self.class_name()
    }
}

/// Registered factories for one role, in registration order.
struct FactorySet<F> {
    role: Role,
    entries: Vec<(ComponentDescriptor, F)>,
}

impl<F> FactorySet<F> {
    fn new(role: Role) -> Self {
        Self {
            role,
            entries: Vec::new(),
        }
    }

    fn register(
        &mut self,
        class_name: &str,
        display_name: &str,
        factory: F,
    ) -> Result<(), RegistryError> {
        if self.entries.iter().any(|(d, _)| d.class_name == class_name) {
            return Err(RegistryError::DuplicateRegistration {
                role: self.role,
                class_name: class_name.to_string(),
            });
        }
        tracing::info!(role = %self.role, class = class_name, "registering component class");
        let descriptor =
            ComponentDescriptor::new(self.role, class_name).with_display_name(display_name);
        self.entries.push((descriptor, factory));
        Ok(())
    }

    fn get(&self, class_name: &str) -> Result<&F, RegistryError> {
        self.entries
            .iter()
            .find(|(d, _)| d.class_name == class_name)
            .map(|(_, f)| f)
            .ok_or_else(|| RegistryError::UnknownClass {
                role: self.role,
                class_name: class_name.to_string(),
            })
    }

    fn descriptors(&self) -> Vec<ComponentDescriptor> {
        self.entries.iter().map(|(d, _)| d.clone()).collect()
    }
}

/// Registry of known implementation classes for every role.
///
/// Populated once at startup, then shared read-only behind an `Arc`;
/// read operations are pure.
pub struct CapabilityRegistry {
    inputs: FactorySet<Arc<dyn InputFactory>>,
    processors: FactorySet<Arc<dyn ProcessorFactory>>,
    outputs: FactorySet<Arc<dyn OutputFactory>>,
    task_classes: Vec<ComponentDescriptor>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            inputs: FactorySet::new(Role::Input),
            processors: FactorySet::new(Role::Processor),
            outputs: FactorySet::new(Role::Output),
            task_classes: Vec::new(),
        }
    }

    pub fn register_input(&mut self, factory: Arc<dyn InputFactory>) -> Result<(), RegistryError> {
        let class_name = factory.class_name().to_string();
        let display_name = factory.display_name().to_string();
        self.inputs.register(&class_name, &display_name, factory)
    }

    pub fn register_processor(
        &mut self,
        factory: Arc<dyn ProcessorFactory>,
    ) -> Result<(), RegistryError> {
        let class_name = factory.class_name().to_string();
        let display_name = factory.display_name().to_string();
        self.processors.register(&class_name, &display_name, factory)
    }

    pub fn register_output(
        &mut self,
        factory: Arc<dyn OutputFactory>,
    ) -> Result<(), RegistryError> {
        let class_name = factory.class_name().to_string();
        let display_name = factory.display_name().to_string();
        self.outputs.register(&class_name, &display_name, factory)
    }

    /// Record a runnable task class. The executor itself is built in; the
    /// class name is the external handle used when creating tasks.
    pub fn register_task_class(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> Result<(), RegistryError> {
        if self
            .task_classes
            .iter()
            .any(|d| d.class_name == descriptor.class_name)
        {
            return Err(RegistryError::DuplicateRegistration {
                role: Role::Task,
                class_name: descriptor.class_name,
            });
        }
        tracing::info!(class = %descriptor.class_name, "registering task class");
        self.task_classes.push(ComponentDescriptor {
            role: Role::Task,
            ..descriptor
        });
        Ok(())
    }

    /// Registered descriptors for a role, in registration order
    pub fn list(&self, role: Role) -> Vec<ComponentDescriptor> {
        match role {
            Role::Input => self.inputs.descriptors(),
            Role::Processor => self.processors.descriptors(),
            Role::Output => self.outputs.descriptors(),
            Role::Task => self.task_classes.clone(),
        }
    }

    pub(crate) fn input_factory(
        &self,
        class_name: &str,
    ) -> Result<&Arc<dyn InputFactory>, RegistryError> {
        self.inputs.get(class_name)
    }

    pub(crate) fn processor_factory(
        &self,
        class_name: &str,
    ) -> Result<&Arc<dyn ProcessorFactory>, RegistryError> {
        self.processors.get(class_name)
    }

    pub(crate) fn output_factory(
        &self,
        class_name: &str,
    ) -> Result<&Arc<dyn OutputFactory>, RegistryError> {
        self.outputs.get(class_name)
    }

    /// Check that a task class is registered
    pub fn task_class(&self, class_name: &str) -> Result<&ComponentDescriptor, RegistryError> {
        self.task_classes
            .iter()
            .find(|d| d.class_name == class_name)
            .ok_or_else(|| RegistryError::UnknownClass {
                role: Role::Task,
                class_name: class_name.to_string(),
            })
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
