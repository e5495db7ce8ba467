//! Append-only JSONL run records.
//!
//! Every run writes to `<report_to>/<unix-seconds-at-run-start>.jsonl`, one
//! self-contained record per successful task. Records are never rewritten.

use crate::config::RunConfig;
use crate::errors::PersistError;
use crate::report::BenchmarkReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

/// One persisted line: the report, the run configuration and the derived
/// statistics, flattened into a single object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub schema_version: u32,
    pub run_id: Uuid,
    #[serde(flatten)]
    pub report: BenchmarkReport,
    pub run_args: RunConfig,
    pub mean_score: f64,
    pub confidence_interval_lower: f64,
    pub confidence_interval_upper: f64,
    pub saved_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(run_id: Uuid, config: &RunConfig, report: &BenchmarkReport) -> Self {
        let ci = report.confidence_interval();
        Self {
            schema_version: SCHEMA_VERSION,
            run_id,
            report: report.clone(),
            run_args: config.clone(),
            mean_score: report.mean_score(),
            confidence_interval_lower: ci.lower,
            confidence_interval_upper: ci.upper,
            saved_at: Utc::now(),
        }
    }

    pub fn task(&self) -> &str {
        &self.report.name
    }
}

/// Writes the records of one run. The target file is fixed at construction.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
    run_id: Uuid,
}

impl ReportWriter {
    pub fn new(report_to: &Path, run_start: DateTime<Utc>, run_id: Uuid) -> Self {
        Self {
            path: report_to.join(format!("{}.jsonl", run_start.timestamp())),
            run_id,
        }
    }

    /// Writer for a run starting now, with a fresh run id.
    pub fn for_run(report_to: &Path) -> Self {
        Self::new(report_to, Utc::now(), Uuid::new_v4())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append one record. The line goes out in a single write on an
    /// append-mode handle so concurrent writers never interleave within it.
    pub fn save(&self, config: &RunConfig, report: &BenchmarkReport) -> Result<RunRecord, PersistError> {
        let record = RunRecord::new(self.run_id, config, report);
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let write_err = |source| PersistError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(&line).map_err(write_err)?;

        tracing::info!(
            "{} on {}: {:.1}%",
            config.model_ckpt,
            report.name,
            record.mean_score * 100.0
        );
        for (split, score) in &report.splits {
            tracing::info!(
                "{} on {} ({}): {:.1}%",
                config.model_ckpt,
                report.name,
                split,
                score * 100.0
            );
        }
        Ok(record)
    }
}

/// Read every `*.jsonl` file in `dir`, in file name order. A missing
/// directory holds no records.
pub fn load_records(dir: &Path) -> Result<Vec<RunRecord>, PersistError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistError::Read {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PersistError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl") {
            files.push(path);
        }
    }
    files.sort();

    let mut records = Vec::new();
    for path in files {
        let raw = std::fs::read_to_string(&path).map_err(|source| PersistError::Read {
            path: path.clone(),
            source,
        })?;
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(line).map_err(|source| PersistError::Decode {
                path: path.clone(),
                line: idx + 1,
                source,
            })?;
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Example;
    use chrono::TimeZone;

    fn report(name: &str, scores: &[f64]) -> BenchmarkReport {
        let examples = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| Example::new(format!("{name}-{i}"), s).with_split("test"))
            .collect();
        BenchmarkReport::from_examples(name, examples).unwrap()
    }

    fn writer(dir: &Path) -> ReportWriter {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        ReportWriter::new(dir, start, Uuid::nil())
    }

    #[test]
    fn file_name_is_run_start_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());
        assert_eq!(w.path(), dir.path().join("1700000000.jsonl"));
    }

    #[test]
    fn two_saves_append_two_parseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("reports").join("nested");
        let w = writer(&nested);
        let cfg = RunConfig::default();

        w.save(&cfg, &report("newt", &[1.0, 0.0, 1.0])).unwrap();
        w.save(&cfg, &report("kabr", &[0.5])).unwrap();

        let raw = std::fs::read_to_string(w.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["schema_version"], SCHEMA_VERSION);
            assert!(value["run_args"]["model_ckpt"].is_string());
            assert!(value["confidence_interval_lower"].is_number());
        }
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["name"], "newt");
        assert_eq!(first["examples"].as_array().unwrap().len(), 3);
        assert_eq!(first["splits"]["test"], first["mean_score"]);
    }

    #[test]
    fn concurrent_writers_never_interleave_lines() {
        const THREADS: usize = 8;
        const SAVES: usize = 5;
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig::default();
        let padding = serde_json::json!("x".repeat(1024));

        std::thread::scope(|scope| {
            for t in 0..THREADS {
                let (cfg, padding) = (&cfg, &padding);
                let dir = dir.path();
                scope.spawn(move || {
                    // Separate writers on the same file, as separate workers would hold.
                    let w = writer(dir);
                    for s in 0..SAVES {
                        let examples = (0..200)
                            .map(|i| {
                                Example::new(format!("{t}-{s}-{i}"), 1.0)
                                    .with_info("pad", padding.clone())
                            })
                            .collect();
                        let report = BenchmarkReport::from_examples(format!("t{t}"), examples).unwrap();
                        w.save(cfg, &report).unwrap();
                    }
                });
            }
        });

        let raw = std::fs::read_to_string(writer(dir.path()).path()).unwrap();
        let mut lines = 0;
        for line in raw.lines() {
            let record: RunRecord = serde_json::from_str(line).unwrap();
            assert_eq!(record.report.examples.len(), 200);
            lines += 1;
        }
        assert_eq!(lines, THREADS * SAVES);
        assert_eq!(load_records(dir.path()).unwrap().len(), THREADS * SAVES);
    }

    #[test]
    fn records_reload_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig::default();
        let late = ReportWriter::new(dir.path(), Utc.timestamp_opt(200, 0).unwrap(), Uuid::new_v4());
        let early = ReportWriter::new(dir.path(), Utc.timestamp_opt(100, 0).unwrap(), Uuid::new_v4());
        late.save(&cfg, &report("plantnet", &[1.0])).unwrap();
        early.save(&cfg, &report("iwildcam", &[0.0, 1.0])).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let records = load_records(dir.path()).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.task()).collect();
        assert_eq!(names, vec!["iwildcam", "plantnet"]);
        assert_eq!(records[0].run_id, early.run_id());
        assert_eq!(records[0].mean_score, 0.5);
        assert_eq!(records[1].run_args, cfg);
    }

    #[test]
    fn malformed_line_names_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());
        w.save(&RunConfig::default(), &report("newt", &[1.0])).unwrap();
        let mut f = OpenOptions::new().append(true).open(w.path()).unwrap();
        writeln!(f).unwrap();
        writeln!(f, "{{truncated").unwrap();

        let err = load_records(dir.path()).unwrap_err();
        match err {
            PersistError::Decode { line, ref path, .. } => {
                assert_eq!(line, 3);
                assert_eq!(path, w.path());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn records_from_newer_versions_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());
        let record = w.save(&RunConfig::default(), &report("newt", &[1.0])).unwrap();
        let mut value = serde_json::to_value(&record).unwrap();
        value["run_args"]["precision"] = serde_json::json!("bf16");
        std::fs::write(w.path(), format!("{value}\n")).unwrap();

        let records = load_records(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run_args, RunConfig::default());
    }

    #[test]
    fn missing_directory_has_no_records() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_records(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn unwritable_target_is_a_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let w = writer(&blocker.join("reports"));
        let err = w.save(&RunConfig::default(), &report("newt", &[1.0])).unwrap_err();
        assert!(matches!(err, PersistError::CreateDir { .. }));
    }
}
