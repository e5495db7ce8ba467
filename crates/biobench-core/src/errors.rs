//! Error types for the benchmark engine.
//!
//! Fatal errors ([`RunError`]) abort a run before any task is dispatched.
//! [`TaskError`] and [`ExecutorError`] are contained per job, and
//! [`PersistError`] only affects the durability of a single report.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backbone and task registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No loader registered under this organization name.
    #[error("unknown backbone: {name} (registered: {})", known.join(", "))]
    UnknownBackbone { name: String, known: Vec<String> },

    /// A loader is already registered under this name.
    #[error("backbone already registered: {name}")]
    DuplicateRegistration { name: String },

    /// The loader rejected the checkpoint or failed to produce a handle.
    #[error("failed to load backbone {org}/{ckpt}: {reason}")]
    LoadFailed {
        org: String,
        ckpt: String,
        reason: String,
    },

    /// No task registered under this name.
    #[error("unknown task: {name} (registered: {})", known.join(", "))]
    UnknownTask { name: String, known: Vec<String> },

    /// A task is already registered under this name.
    #[error("task already registered: {name}")]
    DuplicateTask { name: String },
}

/// Failures of a single task invocation. Serializable so worker processes can
/// hand them back to the orchestrator unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// Nested task configuration did not match the task's config type.
    #[error("invalid config for task {task}: {message}")]
    InvalidConfig { task: String, message: String },

    /// The task itself raised an error.
    #[error("task {task} failed: {message}")]
    Failed { task: String, message: String },

    /// The task completed but produced no examples.
    #[error("task {task} returned a report with no examples")]
    EmptyReport { task: String },
}

impl TaskError {
    pub fn failed(task: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Failed {
            task: task.into(),
            message: format!("{err:#}"),
        }
    }
}

/// Executor backend errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The requested backend is declared but not implemented.
    #[error("executor backend not supported: {kind}")]
    Unsupported { kind: String },

    /// A worker process could not be started.
    #[error("failed to spawn worker for job {job}: {message}")]
    Spawn { job: u64, message: String },

    /// A worker process exited unsuccessfully without a usable reply.
    #[error("worker for job {job} exited with {status}: {stderr}")]
    WorkerExit {
        job: u64,
        status: String,
        stderr: String,
    },

    /// A worker replied with something that is not a valid reply.
    #[error("malformed reply from worker for job {job}: {message}")]
    Protocol { job: u64, message: String },

    /// The job's execution context was lost (panic or cancelled task).
    #[error("job {job} aborted: {message}")]
    Aborted { job: u64, message: String },

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Report persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to create report directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append record to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: malformed record: {source}", path.display())]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fatal, pre-dispatch run errors.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl RunError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Registry(RegistryError::LoadFailed { .. }) => 3,
            _ => 2,
        }
    }
}
