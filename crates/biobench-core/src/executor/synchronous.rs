use super::{run_job, Completion, Executor, Job, JobHandle};
use crate::config::ExecutorKind;
use crate::errors::ExecutorError;
use crate::task::TaskRegistry;
use async_trait::async_trait;
use std::collections::VecDeque;

/// Runs every job on the caller at submit time. No concurrency; completions
/// come back in submission order. Meant for debugging.
#[derive(Debug)]
pub struct SyncExecutor {
    tasks: TaskRegistry,
    next_id: u64,
    done: VecDeque<Completion>,
}

impl SyncExecutor {
    pub fn new(tasks: TaskRegistry) -> Self {
        Self {
            tasks,
            next_id: 0,
            done: VecDeque::new(),
        }
    }
}

#[async_trait]
impl Executor for SyncExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Synchronous
    }

    async fn submit(&mut self, job: Job) -> Result<JobHandle, ExecutorError> {
        let handle = JobHandle { id: self.next_id };
        self.next_id += 1;

        tracing::debug!(job = handle.id, task = %job.task, "running job inline");
        let result = run_job(&self.tasks, &job.task, &job.model, &job.config)
            .map_err(ExecutorError::from);
        self.done.push_back(Completion {
            handle,
            task: job.task,
            result,
        });
        Ok(handle)
    }

    async fn next_completion(&mut self) -> Option<Completion> {
        self.done.pop_front()
    }
}
