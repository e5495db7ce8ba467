//! Benchmark orchestration and reporting engine.
//!
//! This crate runs a battery of independent benchmark tasks against one vision
//! backbone and turns their per-example scores into statistically annotated
//! reports:
//!
//! - [`backbone`]: explicit registry of backbone loaders
//! - [`task`]: the contract every benchmark task implements
//! - [`executor`]: synchronous, multi-process and cluster (unsupported) backends
//! - [`report`]: per-split means and bootstrapped confidence intervals
//! - [`storage`]: append-only JSONL run records
//! - [`orchestrator`]: the run state machine tying it all together

pub mod backbone;
pub mod config;
pub mod errors;
pub mod executor;
pub mod orchestrator;
pub mod report;
pub mod storage;
pub mod task;

pub use backbone::{BackboneRegistry, ModelHandle};
pub use config::{Device, ExecutorKind, RunConfig, TaskToggle};
pub use errors::{
    ConfigError, ExecutorError, PersistError, RegistryError, RunError, TaskError,
};
pub use executor::{Completion, Executor, JobHandle, JobSpec};
pub use orchestrator::{Orchestrator, RunPhase, RunSummary};
pub use report::{BenchmarkReport, ConfidenceInterval, Example};
pub use storage::{ReportWriter, RunRecord};
pub use task::{Task, TaskConfig, TaskRegistry};
