//! The run state machine: Configuring → ResolvingBackbone → Dispatching →
//! Collecting → Done.
//!
//! Everything that can be checked before work starts is checked in
//! Configuring, so a fatal error never leaves a half-run behind. Once jobs
//! are dispatched, failures are contained per task.

use crate::backbone::BackboneRegistry;
use crate::config::{cuda_available, RunConfig};
use crate::errors::{RegistryError, RunError};
use crate::executor::{build_executor, ExecutorOptions, Job};
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::storage::ReportWriter;
use crate::task::TaskRegistry;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Configuring,
    ResolvingBackbone,
    Dispatching,
    Collecting,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuring => "configuring",
            Self::ResolvingBackbone => "resolving_backbone",
            Self::Dispatching => "dispatching",
            Self::Collecting => "collecting",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// A task that did not produce a persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task: String,
    pub reason: String,
}

/// Outcome of a run that reached Done.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub report_path: PathBuf,
    /// Tasks whose record was written, in completion order.
    pub persisted: Vec<String>,
    /// Tasks that failed to produce a report.
    pub failed: Vec<TaskFailure>,
    /// Tasks that produced a report that could not be written.
    pub persist_failed: Vec<TaskFailure>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.persist_failed.is_empty()
    }
}

type CudaProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Drives one run. Registries are borrowed and never modified.
pub struct Orchestrator<'a> {
    backbones: &'a BackboneRegistry,
    tasks: &'a TaskRegistry,
    executor: ExecutorOptions,
    cuda_probe: CudaProbe,
    progress: Option<ProgressSink>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backbones: &'a BackboneRegistry, tasks: &'a TaskRegistry) -> Self {
        Self {
            backbones,
            tasks,
            executor: ExecutorOptions::default(),
            cuda_probe: Arc::new(cuda_available),
            progress: None,
        }
    }

    pub fn with_executor_options(mut self, opts: ExecutorOptions) -> Self {
        self.executor = opts;
        self
    }

    /// Replace the accelerator probe (tests, or hosts where the default
    /// detection is wrong).
    pub fn with_cuda_probe(mut self, probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.cuda_probe = Arc::new(probe);
        self
    }

    pub fn with_progress(mut self, sink: Option<ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub async fn run(&self, config: &RunConfig) -> Result<RunSummary, RunError> {
        enter(RunPhase::Configuring);
        config.validate()?;
        let device = config.device.resolve(|| (self.cuda_probe)());
        let config = config.with_device(device);

        if !self.backbones.contains(&config.model_org) {
            return Err(RegistryError::UnknownBackbone {
                name: config.model_org.clone(),
                known: self.backbones.list_names(),
            }
            .into());
        }

        let mut prepared = Vec::new();
        for (name, toggle) in config.enabled_tasks() {
            let task = self.tasks.get(name)?;
            prepared.push((name.to_string(), task.prepare(&toggle.args, device)?));
        }

        let mut executor = build_executor(config.jobs, self.tasks, &self.executor)?;
        let writer = ReportWriter::for_run(&config.report_to);
        let mut summary = RunSummary {
            run_id: writer.run_id(),
            report_path: writer.path().to_path_buf(),
            persisted: Vec::new(),
            failed: Vec::new(),
            persist_failed: Vec::new(),
        };

        if prepared.is_empty() {
            tracing::info!("no tasks enabled, nothing to run");
            enter(RunPhase::Done);
            return Ok(summary);
        }

        enter(RunPhase::ResolvingBackbone);
        let model = Arc::new(
            self.backbones
                .load(&config.model_org, &config.model_ckpt, device)?,
        );
        tracing::info!(
            org = %model.org,
            ckpt = %model.ckpt,
            device = %model.device,
            executor = %executor.kind(),
            "loaded backbone"
        );

        enter(RunPhase::Dispatching);
        let mut total = 0;
        for (task, task_config) in prepared {
            let job = Job {
                task: task.clone(),
                model: model.clone(),
                config: task_config,
            };
            match executor.submit(job).await {
                Ok(handle) => {
                    tracing::debug!(job = handle.id, task = %task, "dispatched");
                    total += 1;
                }
                Err(e) => {
                    tracing::warn!(task = %task, error = %e, "failed to dispatch task");
                    summary.failed.push(TaskFailure {
                        task,
                        reason: e.to_string(),
                    });
                }
            }
        }

        enter(RunPhase::Collecting);
        let mut done = 0;
        while let Some(completion) = executor.next_completion().await {
            done += 1;
            if let Some(sink) = &self.progress {
                sink(ProgressEvent { done, total });
            }
            let task = completion.task;
            match completion.result {
                Ok(report) => match writer.save(&config, &report) {
                    Ok(_) => summary.persisted.push(task),
                    Err(e) => {
                        tracing::warn!(task = %task, error = %e, "failed to persist report");
                        summary.persist_failed.push(TaskFailure {
                            task,
                            reason: e.to_string(),
                        });
                    }
                },
                Err(e) => {
                    tracing::warn!(task = %task, error = %e, "task failed");
                    summary.failed.push(TaskFailure {
                        task,
                        reason: e.to_string(),
                    });
                }
            }
        }

        enter(RunPhase::Done);
        tracing::info!(
            persisted = summary.persisted.len(),
            failed = summary.failed.len(),
            persist_failed = summary.persist_failed.len(),
            path = %summary.report_path.display(),
            "run finished"
        );
        Ok(summary)
    }
}

fn enter(phase: RunPhase) {
    tracing::debug!(phase = %phase, "run phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::ModelHandle;
    use crate::config::{Device, ExecutorKind, TaskToggle};
    use crate::errors::{ExecutorError, TaskError};
    use crate::report::{BenchmarkReport, Example};
    use crate::storage::load_records;
    use crate::task::{Task, TaskConfig};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct ConstConfig {
        device: Device,
        #[serde(default = "default_n")]
        n_examples: usize,
    }

    fn default_n() -> usize {
        4
    }

    impl TaskConfig for ConstConfig {
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

    struct Const(&'static str, f64);

    impl Task for Const {
        type Config = ConstConfig;

        fn name(&self) -> &str {
            self.0
        }

        fn run(&self, model: &ModelHandle, config: &ConstConfig) -> anyhow::Result<BenchmarkReport> {
            anyhow::ensure!(model.device == config.device, "device not injected");
            let examples = (0..config.n_examples)
                .map(|i| Example::new(format!("{i}"), self.1))
                .collect();
            Ok(BenchmarkReport::from_examples(self.0, examples)?)
        }
    }

    /// Returns a report whose `splits` disagree with its examples.
    struct HandBuilt;

    impl Task for HandBuilt {
        type Config = ConstConfig;

        fn name(&self) -> &str {
            "liar"
        }

        fn run(&self, _model: &ModelHandle, _config: &ConstConfig) -> anyhow::Result<BenchmarkReport> {
            Ok(BenchmarkReport {
                name: "liar".into(),
                examples: vec![
                    Example::new("a", 0.0).with_split("train"),
                    Example::new("b", 1.0).with_split("test"),
                ],
                splits: [("train".to_string(), 0.9)].into_iter().collect(),
            })
        }
    }

    fn backbones(loads: Arc<AtomicUsize>) -> BackboneRegistry {
        let mut registry = BackboneRegistry::new();
        registry
            .register("fake", move |ckpt: &str, device: Device| {
                loads.fetch_add(1, Ordering::SeqCst);
                anyhow::ensure!(ckpt != "missing", "no such checkpoint");
                Ok(ModelHandle::new("fake", ckpt, device))
            })
            .unwrap();
        registry
    }

    fn tasks() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register(Const("alpha", 1.0)).unwrap();
        registry.register(Const("beta", 0.5)).unwrap();
        registry
    }

    fn config(report_to: &std::path::Path, enabled: &[&str]) -> RunConfig {
        let mut cfg = RunConfig {
            model_org: "fake".into(),
            model_ckpt: "tiny".into(),
            device: Device::Cpu,
            report_to: report_to.to_path_buf(),
            ..RunConfig::default()
        };
        for name in enabled {
            cfg.enable_task(name);
        }
        cfg
    }

    #[tokio::test]
    async fn zero_enabled_tasks_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let (b, t) = (backbones(loads.clone()), tasks());
        let summary = Orchestrator::new(&b, &t)
            .run(&config(dir.path(), &[]))
            .await
            .unwrap();
        assert!(summary.persisted.is_empty() && summary.is_clean());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert!(!summary.report_path.exists());
    }

    #[tokio::test]
    async fn every_enabled_task_is_persisted_once() {
        let dir = tempfile::tempdir().unwrap();
        let (b, t) = (backbones(Arc::default()), tasks());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let summary = Orchestrator::new(&b, &t)
            .with_progress(Some(Arc::new(move |ev: ProgressEvent| {
                sink_events.lock().unwrap().push(ev);
            })))
            .run(&config(dir.path(), &["alpha", "beta"]))
            .await
            .unwrap();

        assert_eq!(summary.persisted, vec!["alpha", "beta"]);
        assert!(summary.is_clean());
        let records = load_records(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.run_id == summary.run_id));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ProgressEvent { done: 1, total: 2 },
                ProgressEvent { done: 2, total: 2 }
            ]
        );
    }

    #[tokio::test]
    async fn unknown_backbone_fails_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let (b, t) = (backbones(Arc::default()), tasks());
        let mut cfg = config(dir.path(), &["alpha"]);
        cfg.model_org = "clip".into();
        let err = Orchestrator::new(&b, &t).run(&cfg).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Registry(RegistryError::UnknownBackbone { ref known, .. }) if known == &["fake"]
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn load_failure_is_fatal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (b, t) = (backbones(Arc::default()), tasks());
        let mut cfg = config(dir.path(), &["alpha"]);
        cfg.model_ckpt = "missing".into();
        let err = Orchestrator::new(&b, &t).run(&cfg).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(load_records(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unregistered_or_misconfigured_task_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (b, t) = (backbones(Arc::default()), tasks());
        let orchestrator = Orchestrator::new(&b, &t);

        let err = orchestrator
            .run(&config(dir.path(), &["alpha", "gamma"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Registry(RegistryError::UnknownTask { .. })));

        let mut cfg = config(dir.path(), &[]);
        cfg.tasks.insert(
            "alpha".into(),
            TaskToggle::enabled(serde_json::json!({"n_exampels": 3})),
        );
        let err = orchestrator.run(&cfg).await.unwrap_err();
        assert!(matches!(err, RunError::Task(TaskError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn cluster_backend_is_rejected_before_the_backbone_loads() {
        let dir = tempfile::tempdir().unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let (b, t) = (backbones(loads.clone()), tasks());
        let mut cfg = config(dir.path(), &["alpha"]);
        cfg.jobs = ExecutorKind::Slurm;
        let err = Orchestrator::new(&b, &t).run(&cfg).await.unwrap_err();
        assert!(matches!(err, RunError::Executor(ExecutorError::Unsupported { .. })));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_cuda_falls_back_to_cpu_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let (b, t) = (backbones(Arc::default()), tasks());
        let mut cfg = config(dir.path(), &["alpha"]);
        cfg.device = Device::Cuda;
        let summary = Orchestrator::new(&b, &t)
            .with_cuda_probe(|| false)
            .run(&cfg)
            .await
            .unwrap();
        assert_eq!(summary.persisted, vec!["alpha"]);
        let records = load_records(dir.path()).unwrap();
        assert_eq!(records[0].run_args.device, Device::Cpu);
        // Caller's configuration is untouched.
        assert_eq!(cfg.device, Device::Cuda);
    }

    #[tokio::test]
    async fn persisted_splits_are_derived_from_examples() {
        let dir = tempfile::tempdir().unwrap();
        let b = backbones(Arc::default());
        let mut t = TaskRegistry::new();
        t.register(HandBuilt).unwrap();
        let summary = Orchestrator::new(&b, &t)
            .run(&config(dir.path(), &["liar"]))
            .await
            .unwrap();
        assert_eq!(summary.persisted, vec!["liar"]);

        let records = load_records(dir.path()).unwrap();
        let splits = &records[0].report.splits;
        assert_eq!(splits.len(), 2);
        assert_eq!(splits["train"], 0.0);
        assert_eq!(splits["test"], 1.0);
    }

    #[tokio::test]
    async fn persistence_failure_is_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let (b, t) = (backbones(Arc::default()), tasks());
        let summary = Orchestrator::new(&b, &t)
            .run(&config(&blocker.join("reports"), &["alpha", "beta"]))
            .await
            .unwrap();
        assert!(summary.persisted.is_empty());
        assert_eq!(summary.persist_failed.len(), 2);
        assert!(summary.failed.is_empty());
    }
}
