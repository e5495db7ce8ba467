//! The contract every benchmark task implements, and the registry the
//! orchestrator and worker processes resolve tasks from.
//!
//! Tasks are strongly typed ([`Task::Config`]); the registry erases that type
//! behind JSON so a task's configuration can travel inside a job to another
//! process and be checked again on arrival.

use crate::backbone::ModelHandle;
use crate::config::Device;
use crate::errors::{RegistryError, TaskError};
use crate::report::BenchmarkReport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Per-task configuration. Must carry the accelerator so the orchestrator can
/// inject the run's device uniformly.
pub trait TaskConfig: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn device(&self) -> Device;

    /// Copy of this configuration targeting `device`.
    fn with_device(&self, device: Device) -> Self;
}

/// A benchmark task.
///
/// `run` must be safe to execute inside a worker process: everything it needs
/// arrives through `model` and `config`, and it must not mutate either.
pub trait Task: Send + Sync + 'static {
    type Config: TaskConfig;

    fn name(&self) -> &str;

    fn run(&self, model: &ModelHandle, config: &Self::Config) -> anyhow::Result<BenchmarkReport>;
}

trait ErasedTask: Send + Sync {
    fn name(&self) -> &str;
    fn prepare(&self, args: &Value, device: Device) -> Result<Value, TaskError>;
    fn run_json(&self, model: &ModelHandle, config: &Value) -> Result<BenchmarkReport, TaskError>;
}

impl<T: Task> ErasedTask for T {
    fn name(&self) -> &str {
        Task::name(self)
    }

    fn prepare(&self, args: &Value, device: Device) -> Result<Value, TaskError> {
        let mut object = match args {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(invalid_config(self, format!("expected a mapping, got {other}")));
            }
        };
        object.insert("device".to_string(), serde_json::json!(device));

        let config: T::Config = serde_json::from_value(Value::Object(object))
            .map_err(|e| invalid_config(self, e.to_string()))?;
        let config = config.with_device(device);
        serde_json::to_value(&config).map_err(|e| invalid_config(self, e.to_string()))
    }

    fn run_json(&self, model: &ModelHandle, config: &Value) -> Result<BenchmarkReport, TaskError> {
        let config: T::Config = serde_json::from_value(config.clone())
            .map_err(|e| invalid_config(self, e.to_string()))?;
        // A task that already speaks in `TaskError` keeps its kind.
        let report = Task::run(self, model, &config).map_err(|e| match e.downcast::<TaskError>() {
            Ok(task_err) => task_err,
            Err(e) => TaskError::failed(Task::name(self), &e),
        })?;
        report.normalized()
    }
}

fn invalid_config<T: Task>(task: &T, message: String) -> TaskError {
    TaskError::InvalidConfig {
        task: Task::name(task).to_string(),
        message,
    }
}

/// A task resolved from a [`TaskRegistry`].
#[derive(Clone)]
pub struct RegisteredTask(Arc<dyn ErasedTask>);

impl RegisteredTask {
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Parse the nested configuration and return the per-task copy with the
    /// run's device injected. The caller's configuration is left untouched.
    pub fn prepare(&self, args: &Value, device: Device) -> Result<Value, TaskError> {
        self.0.prepare(args, device)
    }

    /// Run the task. Errors, panics and malformed reports all come back as a
    /// [`TaskError`].
    pub fn run(&self, model: &ModelHandle, config: &Value) -> Result<BenchmarkReport, TaskError> {
        match catch_unwind(AssertUnwindSafe(|| self.0.run_json(model, config))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Failed {
                task: self.name().to_string(),
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }
}

impl std::fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RegisteredTask").field(&self.name()).finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task>(&mut self, task: T) -> Result<(), RegistryError> {
        let name = Task::name(&task).to_string();
        if self.tasks.contains_key(&name) {
            return Err(RegistryError::DuplicateTask { name });
        }
        self.tasks.insert(name, RegisteredTask(Arc::new(task)));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<RegisteredTask, RegistryError> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTask {
                name: name.to_string(),
                known: self.names(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("names", &self.names())
            .finish()
    }
}
