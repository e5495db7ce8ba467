use crate::cli::args::RunArgs;
use crate::exit_codes::{EXIT_BACKBONE_ERROR, EXIT_CONFIG_ERROR, EXIT_SUCCESS};
use biobench_core::config::load_config;
use biobench_core::executor::ExecutorOptions;
use biobench_core::report::console::default_progress_sink;
use biobench_core::{BackboneRegistry, Orchestrator, RunConfig, RunError};

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => return Ok(report_fatal(&e)),
    };

    let backbones = BackboneRegistry::with_builtins()?;
    let tasks = biobench_tasks::builtin_registry()?;
    let total = config.enabled_tasks().count();
    let orchestrator = Orchestrator::new(&backbones, &tasks)
        .with_executor_options(ExecutorOptions {
            workers: args.workers,
            worker_command: None,
        })
        .with_progress(default_progress_sink(total));

    let summary = match orchestrator.run(&config).await {
        Ok(summary) => summary,
        Err(e) => return Ok(report_fatal(&e)),
    };

    for failure in &summary.failed {
        tracing::error!(run_id = %summary.run_id, "FAILED {}: {}", failure.task, failure.reason);
    }
    for failure in &summary.persist_failed {
        tracing::error!(run_id = %summary.run_id, "NOT SAVED {}: {}", failure.task, failure.reason);
    }
    if !summary.persisted.is_empty() {
        tracing::info!(
            run_id = %summary.run_id,
            "{} report(s) written to {}",
            summary.persisted.len(),
            summary.report_path.display()
        );
    }
    Ok(EXIT_SUCCESS)
}

/// Run file (if any) first, then flags on top.
fn resolve_config(args: &RunArgs) -> Result<RunConfig, RunError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RunConfig::default(),
    };
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if let Some(org) = &args.model_org {
        config.model_org = org.clone();
    }
    if let Some(ckpt) = &args.model_ckpt {
        config.model_ckpt = ckpt.clone();
    }
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(dir) = &args.report_to {
        config.report_to = dir.clone();
    }
    for name in args.enabled_tasks() {
        config.enable_task(name);
    }
    config.validate()?;
    Ok(config)
}

fn report_fatal(err: &RunError) -> i32 {
    eprintln!("error: {err}");
    match err.exit_code() {
        3 => EXIT_BACKBONE_ERROR,
        _ => EXIT_CONFIG_ERROR,
    }
}
