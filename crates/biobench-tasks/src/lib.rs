//! Built-in benchmark tasks.
//!
//! Each task delegates scoring to an external harness process: the harness
//! receives `{task, model, config}` as JSON on stdin and prints one JSON line
//! per scored example, `{"id", "score", "split"?, "info"?}`. This keeps
//! feature extraction and classifiers out of the engine while the task
//! contract stays the same as for in-process tasks.

mod harness;

pub use harness::{HarnessConfig, HarnessTask};

use biobench_core::errors::RegistryError;
use biobench_core::TaskRegistry;

pub const NEWT: &str = "newt";
pub const KABR: &str = "kabr";
pub const PLANTNET: &str = "plantnet";
pub const IWILDCAM: &str = "iwildcam";

/// Names of the built-in tasks, in registry order.
pub const BUILTIN_TASKS: [&str; 4] = [IWILDCAM, KABR, NEWT, PLANTNET];

pub fn register_builtin_tasks(registry: &mut TaskRegistry) -> Result<(), RegistryError> {
    for name in BUILTIN_TASKS {
        registry.register(HarnessTask::new(name))?;
    }
    Ok(())
}

/// A fresh registry holding every built-in task.
pub fn builtin_registry() -> Result<TaskRegistry, RegistryError> {
    let mut registry = TaskRegistry::new();
    register_builtin_tasks(&mut registry)?;
    Ok(registry)
}
