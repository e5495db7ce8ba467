//! Benchmark reports: per-example scores aggregated into an overall mean,
//! per-split means and a bootstrapped confidence interval.

pub mod bootstrap;
pub mod console;
pub mod progress;

pub use bootstrap::{Bootstrap, ConfidenceInterval};

use crate::errors::TaskError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One scored example. Scores live in `[0, 1]`; categorical correctness is
/// recorded as `1.0` / `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
    /// Task-specific metadata (predicted label, true label, ...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub info: serde_json::Map<String, serde_json::Value>,
}

impl Example {
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
            split: None,
            info: serde_json::Map::new(),
        }
    }

    pub fn correct(id: impl Into<String>, correct: bool) -> Self {
        Self::new(id, if correct { 1.0 } else { 0.0 })
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = Some(split.into());
        self
    }

    pub fn with_info(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.info.insert(key.into(), value);
        self
    }
}

/// The result of running one task once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub name: String,
    pub examples: Vec<Example>,
    pub splits: BTreeMap<String, f64>,
}

impl BenchmarkReport {
    /// Aggregate examples into a report, deriving the per-split means.
    /// An empty example list is a task contract violation.
    pub fn from_examples(name: impl Into<String>, examples: Vec<Example>) -> Result<Self, TaskError> {
        let name = name.into();
        if examples.is_empty() {
            return Err(TaskError::EmptyReport { task: name });
        }
        let splits = split_means(&examples);
        let report = Self {
            name,
            examples,
            splits,
        };
        report.validate()?;
        Ok(report)
    }

    /// Checks a report handed back by a task before it is persisted.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.examples.is_empty() {
            return Err(TaskError::EmptyReport {
                task: self.name.clone(),
            });
        }
        if let Some(bad) = self
            .examples
            .iter()
            .find(|ex| !ex.score.is_finite() || !(0.0..=1.0).contains(&ex.score))
        {
            return Err(TaskError::Failed {
                task: self.name.clone(),
                message: format!("example {} has score {} outside [0, 1]", bad.id, bad.score),
            });
        }
        let labels: BTreeSet<&str> = self
            .examples
            .iter()
            .filter_map(|ex| ex.split.as_deref())
            .collect();
        if let Some(stray) = self.splits.keys().find(|k| !labels.contains(k.as_str())) {
            return Err(TaskError::Failed {
                task: self.name.clone(),
                message: format!("split '{stray}' has no examples"),
            });
        }
        Ok(())
    }

    /// Validate a report handed back by a task and rebuild its per-split
    /// means from the examples, whatever the task put in `splits`.
    pub fn normalized(mut self) -> Result<Self, TaskError> {
        self.validate()?;
        let splits = split_means(&self.examples);
        if splits != self.splits {
            tracing::debug!(task = %self.name, "task splits differ from its examples, rebuilt");
        }
        self.splits = splits;
        Ok(self)
    }

    pub fn scores(&self) -> Vec<f64> {
        self.examples.iter().map(|ex| ex.score).collect()
    }

    /// Mean score over all examples (NaN for an empty report).
    pub fn mean_score(&self) -> f64 {
        mean(&self.scores())
    }

    /// 95% bootstrap interval with the default resampling settings.
    pub fn confidence_interval(&self) -> ConfidenceInterval {
        Bootstrap::default().interval(&self.scores())
    }
}

/// Mean score of each distinct split label.
pub fn split_means(examples: &[Example]) -> BTreeMap<String, f64> {
    let mut acc: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for ex in examples {
        if let Some(split) = ex.split.as_deref() {
            acc.entry(split).or_default().push(ex.score);
        }
    }
    acc.into_iter()
        .map(|(label, scores)| (label.to_string(), mean(&scores)))
        .collect()
}

/// Arithmetic mean with compensated summation.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sum = 0.0_f64;
    let mut comp = 0.0_f64;
    for &v in values {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            comp += (sum - t) + v;
        } else {
            comp += (v - t) + sum;
        }
        sum = t;
    }
    (sum + comp) / values.len() as f64
}
