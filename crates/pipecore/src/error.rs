use crate::stage::Role;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned synchronously by the capability and instance registries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("class '{class_name}' is already registered for role {role}")]
    DuplicateRegistration { role: Role, class_name: String },

    #[error("unknown class '{class_name}' for role {role}")]
    UnknownClass { role: Role, class_name: String },

    #[error("name '{name}' already exists for role {role}")]
    NameAlreadyExists { role: Role, name: String },

    #[error("no instance named '{name}' for role {role}")]
    InstanceNotFound { role: Role, name: String },

    #[error("instance '{name}' ({role}) is referenced by task '{task}'")]
    InstanceInUse {
        role: Role,
        name: String,
        task: String,
    },
}

/// Errors raised by stage components.
///
/// The executor recovers `Record` errors locally (counted, logged, run
/// continues) while `Systemic` errors abort the run as `Failed`.
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("record failed: {0}")]
    Record(String),

    #[error("systemic fault: {0}")]
    Systemic(String),

    #[error("cancelled")]
    Cancelled,
}

impl StageError {
    pub fn is_systemic(&self) -> bool {
        matches!(self, StageError::Systemic(_))
    }
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task '{0}' is already running")]
    TaskAlreadyRunning(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("stage error: {0}")]
    Stage(#[from] StageError),
}

/// Errors from the external graph-store collaborator.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    #[error("missing query parameter: {0}")]
    MissingParameter(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for StageError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(message) => StageError::Systemic(message),
            other => StageError::Record(other.to_string()),
        }
    }
}
