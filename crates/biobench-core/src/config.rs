use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_MODEL_ORG: &str = "open-clip";
pub const DEFAULT_MODEL_CKPT: &str = "RN50/openai";
pub const DEFAULT_REPORT_DIR: &str = "reports";

/// Accelerator a run (and every task in it) executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    #[default]
    Cuda,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }

    /// Resolve the requested device against the host. A missing GPU is not an
    /// error: the run falls back to the CPU with a warning.
    pub fn resolve(self, cuda_available: impl FnOnce() -> bool) -> Device {
        match self {
            Device::Cuda if !cuda_available() => {
                tracing::warn!("No CUDA GPU found. Using CPU instead.");
                Device::Cpu
            }
            other => other,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            other => Err(format!("unknown device '{other}' (expected cpu|cuda)")),
        }
    }
}

/// Best-effort probe for an NVIDIA driver on this host.
pub fn cuda_available() -> bool {
    if std::env::var_os("CUDA_VISIBLE_DEVICES").is_some_and(|v| v.is_empty() || v == "-1") {
        return false;
    }
    Path::new("/proc/driver/nvidia/version").exists() || Path::new("/dev/nvidiactl").exists()
}

/// Which executor backend runs the jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutorKind {
    /// Submit to a cluster scheduler. Declared, not implemented.
    #[serde(rename = "slurm")]
    Slurm,
    /// Pool of worker processes on this machine.
    #[serde(rename = "process")]
    Process,
    /// No parallelism: run each job in the calling process.
    #[default]
    #[serde(rename = "none")]
    Synchronous,
}

impl ExecutorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutorKind::Slurm => "slurm",
            ExecutorKind::Process => "process",
            ExecutorKind::Synchronous => "none",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slurm" => Ok(ExecutorKind::Slurm),
            "process" => Ok(ExecutorKind::Process),
            "none" => Ok(ExecutorKind::Synchronous),
            other => Err(format!(
                "unknown jobs backend '{other}' (expected slurm|process|none)"
            )),
        }
    }
}

/// Enable flag plus nested, task-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskToggle {
    pub run: bool,
    pub args: serde_json::Value,
}

impl Default for TaskToggle {
    fn default() -> Self {
        Self {
            run: false,
            args: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

impl TaskToggle {
    pub fn enabled(args: serde_json::Value) -> Self {
        Self { run: true, args }
    }
}

/// Everything that determines one run. Built once, never mutated after the
/// orchestrator starts; per-task copies are derived from it at dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub jobs: ExecutorKind,
    pub model_org: String,
    pub model_ckpt: String,
    pub device: Device,
    pub tasks: BTreeMap<String, TaskToggle>,
    pub report_to: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs: ExecutorKind::default(),
            model_org: DEFAULT_MODEL_ORG.to_string(),
            model_ckpt: DEFAULT_MODEL_CKPT.to_string(),
            device: Device::default(),
            tasks: BTreeMap::new(),
            report_to: PathBuf::from(".").join(DEFAULT_REPORT_DIR),
        }
    }
}

impl RunConfig {
    /// Enabled tasks in name order; this is also the submission order.
    pub fn enabled_tasks(&self) -> impl Iterator<Item = (&str, &TaskToggle)> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.run)
            .map(|(name, t)| (name.as_str(), t))
    }

    /// Turn a task on, keeping any nested configuration it already has.
    pub fn enable_task(&mut self, name: &str) {
        self.tasks.entry(name.to_string()).or_default().run = true;
    }

    pub fn with_device(&self, device: Device) -> Self {
        Self {
            device,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_org.trim().is_empty() {
            return Err(ConfigError::Invalid("model_org must not be empty".into()));
        }
        if self.model_ckpt.trim().is_empty() {
            return Err(ConfigError::Invalid("model_ckpt must not be empty".into()));
        }
        if self.report_to.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("report_to must not be empty".into()));
        }
        for (name, toggle) in &self.tasks {
            if !(toggle.args.is_object() || toggle.args.is_null()) {
                return Err(ConfigError::Invalid(format!(
                    "tasks.{name}.args must be a mapping"
                )));
            }
        }
        Ok(())
    }
}

/// Strict view of [`RunConfig`] for hand-written run files. Saved records
/// embed a plain `RunConfig` and tolerate fields added by newer versions.
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RunFile {
    jobs: ExecutorKind,
    model_org: String,
    model_ckpt: String,
    device: Device,
    tasks: BTreeMap<String, TaskToggle>,
    report_to: PathBuf,
}

impl Default for RunFile {
    fn default() -> Self {
        let RunConfig {
            jobs,
            model_org,
            model_ckpt,
            device,
            tasks,
            report_to,
        } = RunConfig::default();
        Self {
            jobs,
            model_org,
            model_ckpt,
            device,
            tasks,
            report_to,
        }
    }
}

impl From<RunFile> for RunConfig {
    fn from(file: RunFile) -> Self {
        Self {
            jobs: file.jobs,
            model_org: file.model_org,
            model_ckpt: file.model_ckpt,
            device: file.device,
            tasks: file.tasks,
            report_to: file.report_to,
        }
    }
}

/// Load a run file. Missing fields fall back to [`RunConfig::default`].
pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: RunConfig = serde_yaml::from_str::<RunFile>(&raw)
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .into();
    cfg.validate()?;
    Ok(cfg)
}
