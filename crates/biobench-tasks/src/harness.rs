use anyhow::{bail, Context};
use biobench_core::{BenchmarkReport, Device, Example, ModelHandle, Task, TaskConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

const STDERR_TAIL_LINES: usize = 20;

fn default_seed() -> u64 {
    42
}

/// Configuration shared by every harness task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub device: Device,
    /// Dataset root, passed through to the harness untouched.
    #[serde(default)]
    pub datadir: PathBuf,
    /// Keep only the first `n` scored examples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_examples: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Program and arguments of the scorer.
    #[serde(default)]
    pub harness: Vec<String>,
}

impl TaskConfig for HarnessConfig {
    fn device(&self) -> Device {
        self.device
    }

    fn with_device(&self, device: Device) -> Self {
        Self {
            device,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessTask {
    name: &'static str,
}

impl HarnessTask {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[derive(Serialize)]
struct HarnessInput<'a> {
    task: &'a str,
    model: &'a ModelHandle,
    config: &'a HarnessConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Score {
    Correct(bool),
    Value(f64),
}

#[derive(Deserialize)]
struct HarnessLine {
    id: Value,
    score: Score,
    #[serde(default)]
    split: Option<String>,
    #[serde(default)]
    info: serde_json::Map<String, Value>,
}

impl HarnessLine {
    fn into_example(self) -> anyhow::Result<Example> {
        let id = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let score = match self.score {
            Score::Correct(c) => if c { 1.0 } else { 0.0 },
            Score::Value(v) => v,
        };
        if !(0.0..=1.0).contains(&score) {
            bail!("example {id} has score {score} outside [0, 1]");
        }
        Ok(Example {
            id,
            score,
            split: self.split,
            info: self.info,
        })
    }
}

impl Task for HarnessTask {
    type Config = HarnessConfig;

    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, model: &ModelHandle, config: &HarnessConfig) -> anyhow::Result<BenchmarkReport> {
        let Some((program, args)) = config.harness.split_first() else {
            bail!("no harness command configured");
        };

        let payload = serde_json::to_vec(&HarnessInput {
            task: self.name,
            model,
            config,
        })?;

        tracing::debug!(task = self.name, program = %program, "starting harness");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start harness {program}"))?;

        // Feed stdin from another thread so a chatty harness cannot deadlock
        // against a full stdout pipe.
        let feeder = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&payload))
        });
        let output = child
            .wait_with_output()
            .context("failed to wait for harness")?;
        if let Some(feeder) = feeder {
            // A harness that ignores its input closes the pipe early.
            match feeder.join() {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!(task = self.name, error = %e, "failed to feed harness input");
                }
                Ok(_) => {}
                Err(_) => tracing::debug!(task = self.name, "harness input feeder panicked"),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            bail!("harness exited with {}: {}", output.status, tail.trim());
        }

        let stdout = String::from_utf8(output.stdout).context("harness output is not UTF-8")?;
        let limit = config.n_examples.unwrap_or(usize::MAX);
        let mut examples = Vec::new();
        for (idx, line) in stdout.lines().enumerate() {
            if examples.len() >= limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let parsed: HarnessLine = serde_json::from_str(line)
                .with_context(|| format!("malformed harness output on line {}", idx + 1))?;
            examples.push(
                parsed
                    .into_example()
                    .with_context(|| format!("bad example on line {}", idx + 1))?,
            );
        }

        Ok(BenchmarkReport::from_examples(self.name, examples)?)
    }
}
