//! Worker side of the process executor protocol.
//!
//! One [`JobSpec`](super::JobSpec) arrives on stdin as JSON, one
//! [`WorkerReply`] leaves on stdout as a single JSON line. Logging must go to
//! stderr so stdout stays a clean channel.

use super::{run_job, JobSpec};
use crate::errors::TaskError;
use crate::report::BenchmarkReport;
use crate::task::TaskRegistry;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerReply {
    Ok(BenchmarkReport),
    Err(TaskError),
}

/// Serve exactly one job. Returns whether the task succeeded; I/O and
/// protocol problems are errors.
pub fn serve(tasks: &TaskRegistry, mut input: impl Read, mut output: impl Write) -> anyhow::Result<bool> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .context("failed to read job from stdin")?;
    let spec: JobSpec = serde_json::from_str(&raw).context("failed to parse job")?;

    tracing::debug!(job = spec.job_id, task = %spec.task, "worker picked up job");
    let reply = match run_job(tasks, &spec.task, &spec.model, &spec.config) {
        Ok(report) => WorkerReply::Ok(report),
        Err(e) => WorkerReply::Err(e),
    };
    let ok = matches!(reply, WorkerReply::Ok(_));

    let mut line = serde_json::to_vec(&reply).context("failed to encode reply")?;
    line.push(b'\n');
    output.write_all(&line).context("failed to write reply")?;
    output.flush().context("failed to flush reply")?;
    Ok(ok)
}
