//! Non-parametric bootstrap confidence intervals for a mean score.

use super::mean;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RESAMPLES: usize = 1000;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CONFIDENCE: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn point(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Resampling settings. Same settings + same scores = same interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bootstrap {
    pub n_resamples: usize,
    /// Two-sided confidence level in percent.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self {
            n_resamples: DEFAULT_RESAMPLES,
            confidence: DEFAULT_CONFIDENCE,
            seed: DEFAULT_SEED,
        }
    }
}

impl Bootstrap {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_resamples(mut self, n_resamples: usize) -> Self {
        self.n_resamples = n_resamples;
        self
    }

    /// Percentile interval of the resample means, widened if needed so it
    /// always contains the point estimate. Empty input yields a NaN point.
    pub fn interval(&self, scores: &[f64]) -> ConfidenceInterval {
        let point = mean(scores);
        if scores.is_empty() || self.n_resamples == 0 {
            return ConfidenceInterval::point(point);
        }

        let mut means = self.resample_means(scores);
        means.sort_by(f64::total_cmp);

        let tail = (100.0 - self.confidence.clamp(0.0, 100.0)) / 2.0;
        let lower = percentile(&means, tail);
        let upper = percentile(&means, 100.0 - tail);
        ConfidenceInterval {
            lower: lower.min(point),
            upper: upper.max(point),
        }
    }

    fn resample_means(&self, scores: &[f64]) -> Vec<f64> {
        let n = scores.len();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sample = vec![0.0; n];
        (0..self.n_resamples)
            .map(|_| {
                for slot in sample.iter_mut() {
                    *slot = scores[rng.gen_range(0..n)];
                }
                mean(&sample)
            })
            .collect()
    }
}

/// `q`-th percentile (0..=100) of sorted data, interpolating linearly between
/// the two nearest ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
