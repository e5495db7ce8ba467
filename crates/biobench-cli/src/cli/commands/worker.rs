use crate::exit_codes::{EXIT_SUCCESS, EXIT_TASK_FAILED};
use biobench_core::executor::worker::serve;

/// Worker entry point. Must see the same tasks as the parent.
pub fn run() -> anyhow::Result<i32> {
    let tasks = biobench_tasks::builtin_registry()?;
    let ok = serve(&tasks, std::io::stdin().lock(), std::io::stdout().lock())?;
    Ok(if ok { EXIT_SUCCESS } else { EXIT_TASK_FAILED })
}
