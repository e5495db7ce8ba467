use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::storage::RunRecord;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Format a single progress line. Deterministic, unit-testable.
#[must_use]
pub fn format_progress_line(done: usize, total: usize) -> String {
    format!("Finished task {done}/{total}...")
}

/// Minimum interval between progress updates.
const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

pub(crate) fn progress_step(total: usize) -> usize {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

/// Throttled progress sink printing to stderr. Nothing for single-task runs;
/// the final `total/total` line is always printed.
pub fn default_progress_sink(total: usize) -> Option<ProgressSink> {
    if total <= 1 {
        return None;
    }
    let step = progress_step(total);
    let last_emit: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    Some(Arc::new(move |ev: ProgressEvent| {
        if ev.total == 0 {
            return;
        }
        let now = Instant::now();
        let should_emit = {
            let mut last = last_emit.lock().unwrap_or_else(|e| e.into_inner());
            let emit_final = ev.done == ev.total;
            let emit_step = ev.done % step == 0 || ev.done == 1;
            let interval_ok = last
                .map(|t| {
                    now.saturating_duration_since(t)
                        >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
                })
                .unwrap_or(true);
            let ok = emit_final || (emit_step && interval_ok);
            if ok {
                *last = Some(now);
            }
            ok
        };
        if should_emit {
            eprintln!("{}", format_progress_line(ev.done, ev.total));
        }
    }))
}

/// One summary line: task, checkpoint, mean and 95% interval as percentages.
#[must_use]
pub fn format_record_line(record: &RunRecord) -> String {
    format!(
        "{:<10} {:<40} {:>6.1}%  [{:.1}, {:.1}]  (n={})",
        record.task(),
        format!("{}/{}", record.run_args.model_org, record.run_args.model_ckpt),
        record.mean_score * 100.0,
        record.confidence_interval_lower * 100.0,
        record.confidence_interval_upper * 100.0,
        record.report.examples.len()
    )
}

/// Records grouped by task, best score first within a task.
pub fn sort_records(records: &mut [RunRecord]) {
    records.sort_by(|a, b| {
        a.task().cmp(b.task()).then_with(|| {
            b.mean_score
                .partial_cmp(&a.mean_score)
                .unwrap_or(Ordering::Equal)
        })
    });
}

pub fn print_records(records: &[RunRecord]) {
    let mut sorted = records.to_vec();
    sort_records(&mut sorted);
    for record in &sorted {
        println!("{}", format_record_line(record));
    }
}
