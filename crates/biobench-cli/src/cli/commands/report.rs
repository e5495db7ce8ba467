use crate::cli::args::ReportArgs;
use crate::exit_codes::EXIT_SUCCESS;
use anyhow::Context;
use biobench_core::report::console::print_records;
use biobench_core::storage::load_records;

pub fn run(args: ReportArgs) -> anyhow::Result<i32> {
    let mut records = load_records(&args.report_to)
        .with_context(|| format!("failed to load reports from {}", args.report_to.display()))?;
    if let Some(task) = &args.task {
        records.retain(|r| r.task() == task);
    }
    if records.is_empty() {
        eprintln!("no reports in {}", args.report_to.display());
        return Ok(EXIT_SUCCESS);
    }
    print_records(&records);
    Ok(EXIT_SUCCESS)
}
