use biobench_core::{Device, ExecutorKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "biobench",
    version,
    about = "Benchmark vision backbones on biology tasks and report bootstrapped scores"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run every enabled task against one backbone
    Run(RunArgs),
    /// Summarize the records in a report directory
    Report(ReportArgs),
    /// List registered backbone organizations
    Backbones,
    /// Serve one job from stdin (spawned by the process executor)
    #[command(hide = true)]
    Worker,
}

/// Flags override values from `--config`.
#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    /// YAML run file with nested per-task configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Executor backend: none|process|slurm
    #[arg(long, env = "BIOBENCH_JOBS")]
    pub jobs: Option<ExecutorKind>,

    /// Backbone organization (see `biobench backbones`)
    #[arg(long)]
    pub model_org: Option<String>,

    /// Checkpoint id understood by the backbone loader
    #[arg(long)]
    pub model_ckpt: Option<String>,

    /// Accelerator: cpu|cuda
    #[arg(long, env = "BIOBENCH_DEVICE")]
    pub device: Option<Device>,

    /// Directory receiving the run's JSONL records
    #[arg(long, env = "BIOBENCH_REPORT_TO")]
    pub report_to: Option<PathBuf>,

    /// Worker processes for `--jobs process` (default: available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub newt_run: bool,

    #[arg(long)]
    pub kabr_run: bool,

    #[arg(long)]
    pub plantnet_run: bool,

    #[arg(long)]
    pub iwildcam_run: bool,
}

impl RunArgs {
    /// Task names switched on from the command line.
    pub fn enabled_tasks(&self) -> Vec<&'static str> {
        [
            (biobench_tasks::NEWT, self.newt_run),
            (biobench_tasks::KABR, self.kabr_run),
            (biobench_tasks::PLANTNET, self.plantnet_run),
            (biobench_tasks::IWILDCAM, self.iwildcam_run),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

#[derive(Parser, Clone, Debug)]
pub struct ReportArgs {
    #[arg(long, env = "BIOBENCH_REPORT_TO", default_value = "./reports")]
    pub report_to: PathBuf,

    /// Only show records of this task
    #[arg(long)]
    pub task: Option<String>,
}
