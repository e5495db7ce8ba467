use super::worker::WorkerReply;
use super::{Completion, Executor, Job, JobHandle, JobSpec};
use crate::config::ExecutorKind;
use crate::errors::ExecutorError;
use crate::report::BenchmarkReport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

const STDERR_TAIL_LINES: usize = 20;

/// How to start one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// This binary's hidden `worker` subcommand.
    pub fn current_exe() -> Result<Self, ExecutorError> {
        let program = std::env::current_exe().map_err(|e| ExecutorError::Spawn {
            job: 0,
            message: format!("cannot locate current executable: {e}"),
        })?;
        Ok(Self::new(program, ["worker"]))
    }
}

/// Fans jobs out to worker processes, at most `workers` alive at once.
///
/// Every job crosses the process boundary as JSON: the [`JobSpec`] goes to the
/// worker's stdin, a [`WorkerReply`] comes back on its stdout. A worker that
/// crashes takes only its own job down.
pub struct ProcessExecutor {
    command: Arc<WorkerCommand>,
    permits: Arc<Semaphore>,
    running: JoinSet<Result<BenchmarkReport, ExecutorError>>,
    jobs: HashMap<Id, (JobHandle, String)>,
    next_id: u64,
}

impl ProcessExecutor {
    pub fn new(command: WorkerCommand, workers: usize) -> Self {
        Self {
            command: Arc::new(command),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            running: JoinSet::new(),
            jobs: HashMap::new(),
            next_id: 0,
        }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Process
    }

    async fn submit(&mut self, job: Job) -> Result<JobHandle, ExecutorError> {
        let handle = JobHandle { id: self.next_id };
        self.next_id += 1;

        let spec = JobSpec::new(handle.id, &job);
        let command = self.command.clone();
        let permits = self.permits.clone();
        let abort = self.running.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| ExecutorError::Aborted {
                    job: spec.job_id,
                    message: e.to_string(),
                })?;
            run_in_worker(&command, &spec).await
        });
        self.jobs.insert(abort.id(), (handle, job.task));
        tracing::debug!(job = handle.id, "submitted job to worker pool");
        Ok(handle)
    }

    async fn next_completion(&mut self) -> Option<Completion> {
        let (id, result) = match self.running.join_next_with_id().await? {
            Ok((id, result)) => (id, result),
            Err(join_err) => {
                let id = join_err.id();
                let job = self.jobs.get(&id).map(|(h, _)| h.id).unwrap_or_default();
                (
                    id,
                    Err(ExecutorError::Aborted {
                        job,
                        message: join_err.to_string(),
                    }),
                )
            }
        };
        let (handle, task) = self.jobs.remove(&id)?;
        Some(Completion {
            handle,
            task,
            result,
        })
    }
}

async fn run_in_worker(
    command: &WorkerCommand,
    spec: &JobSpec,
) -> Result<BenchmarkReport, ExecutorError> {
    let job = spec.job_id;
    let payload = serde_json::to_vec(spec).map_err(|e| ExecutorError::Protocol {
        job,
        message: e.to_string(),
    })?;

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecutorError::Spawn {
            job,
            message: format!("{}: {e}", command.program.display()),
        })?;

    // A worker that dies before reading its input is reported by exit status
    // below, so a broken pipe here is not an error on its own.
    let write_result = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(&payload).await,
        None => Ok(()),
    };

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ExecutorError::Aborted {
            job,
            message: format!("failed to wait for worker: {e}"),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => match serde_json::from_str::<WorkerReply>(line) {
            Ok(WorkerReply::Ok(report)) => Ok(report.normalized()?),
            Ok(WorkerReply::Err(task_err)) => Err(task_err.into()),
            Err(e) if output.status.success() => Err(ExecutorError::Protocol {
                job,
                message: e.to_string(),
            }),
            Err(_) => Err(worker_exit(job, &output)),
        },
        None if !output.status.success() => Err(worker_exit(job, &output)),
        None => Err(ExecutorError::Protocol {
            job,
            message: match write_result {
                Err(e) => format!("failed to send job: {e}"),
                Ok(()) => "worker exited without a reply".to_string(),
            },
        }),
    }
}

fn worker_exit(job: u64, output: &std::process::Output) -> ExecutorError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    ExecutorError::WorkerExit {
        job,
        status: output.status.to_string(),
        stderr: tail,
    }
}
