//! Executor backends: submit jobs, then collect completions in arrival order.
//!
//! The set of backends is closed ([`ExecutorKind`]). `none` runs each job on
//! the caller as soon as it is submitted, `process` fans jobs out to worker
//! processes, and `slurm` is rejected by [`build_executor`] before any job is
//! dispatched.

mod process;
mod synchronous;
pub mod worker;

pub use process::{ProcessExecutor, WorkerCommand};
pub use synchronous::SyncExecutor;

use crate::backbone::ModelHandle;
use crate::config::ExecutorKind;
use crate::errors::{ExecutorError, TaskError};
use crate::report::BenchmarkReport;
use crate::task::TaskRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A unit of work handed to an executor. The model handle is shared
/// read-only between every job of a run.
#[derive(Debug, Clone)]
pub struct Job {
    pub task: String,
    pub model: Arc<ModelHandle>,
    /// Per-task configuration, device already injected.
    pub config: serde_json::Value,
}

/// Wire form of a [`Job`], as written to a worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: u64,
    pub task: String,
    pub model: ModelHandle,
    pub config: serde_json::Value,
}

impl JobSpec {
    pub fn new(job_id: u64, job: &Job) -> Self {
        Self {
            job_id,
            task: job.task.clone(),
            model: ModelHandle::clone(&job.model),
            config: job.config.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle {
    pub id: u64,
}

/// A finished job: either a report or the error that took it down.
#[derive(Debug)]
pub struct Completion {
    pub handle: JobHandle,
    pub task: String,
    pub result: Result<BenchmarkReport, ExecutorError>,
}

#[async_trait]
pub trait Executor: Send {
    fn kind(&self) -> ExecutorKind;

    async fn submit(&mut self, job: Job) -> Result<JobHandle, ExecutorError>;

    /// Next finished job in arrival order, or `None` once nothing is
    /// outstanding. Blocks until at least one outstanding job completes.
    async fn next_completion(&mut self) -> Option<Completion>;

    /// Drain every outstanding job.
    async fn wait_all(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        while let Some(completion) = self.next_completion().await {
            done.push(completion);
        }
        done
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Process pool size; defaults to the host's available parallelism.
    pub workers: Option<usize>,
    /// How to start a worker process; defaults to `<current exe> worker`.
    pub worker_command: Option<WorkerCommand>,
}

/// Build the backend for `kind`. Unsupported backends fail here, at startup.
pub fn build_executor(
    kind: ExecutorKind,
    tasks: &TaskRegistry,
    opts: &ExecutorOptions,
) -> Result<Box<dyn Executor>, ExecutorError> {
    match kind {
        ExecutorKind::Synchronous => Ok(Box::new(SyncExecutor::new(tasks.clone()))),
        ExecutorKind::Process => {
            let command = match &opts.worker_command {
                Some(command) => command.clone(),
                None => WorkerCommand::current_exe()?,
            };
            let workers = opts.workers.unwrap_or_else(default_workers);
            Ok(Box::new(ProcessExecutor::new(command, workers)))
        }
        ExecutorKind::Slurm => Err(ExecutorError::Unsupported {
            kind: kind.to_string(),
        }),
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve and run one job in this process.
pub fn run_job(
    tasks: &TaskRegistry,
    task: &str,
    model: &ModelHandle,
    config: &serde_json::Value,
) -> Result<BenchmarkReport, TaskError> {
    let registered = tasks.get(task).map_err(|e| TaskError::Failed {
        task: task.to_string(),
        message: e.to_string(),
    })?;
    registered.run(model, config)
}
