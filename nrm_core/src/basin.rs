//! Basin classification and post-perturbation restoration.

use crate::config::{Perturbation, RestorationConfig, TrackedMetric};
use crate::constants::DEFAULT_VIABILITY_THRESHOLD;
use crate::metrics::{mean, CycleMetrics};
use serde::{Deserialize, Serialize};

/// Coarse fate of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basin {
    /// Sustained homeostasis.
    A,
    /// Collapse.
    B,
}

impl std::fmt::Display for Basin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Basin::A => write!(f, "A"),
            Basin::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasinClassifier {
    pub viability_threshold: f64,
}

impl Default for BasinClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_VIABILITY_THRESHOLD)
    }
}

impl BasinClassifier {
    pub fn new(viability_threshold: f64) -> Self {
        Self { viability_threshold }
    }

    /// `A` iff the mean population per unit is strictly above the threshold.
    pub fn classify(&self, mean_population_per_unit: f64) -> Basin {
        if mean_population_per_unit > self.viability_threshold {
            Basin::A
        } else {
            Basin::B
        }
    }

    /// Share of units (populations, clusters, ...) whose size is in Basin A.
    pub fn viable_fraction(&self, sizes: &[usize]) -> f64 {
        if sizes.is_empty() {
            return 0.0;
        }
        let viable = sizes
            .iter()
            .filter(|&&s| self.classify(s as f64) == Basin::A)
            .count();
        viable as f64 / sizes.len() as f64
    }
}

/// Outcome of a restoration check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestorationReport {
    pub metric: TrackedMetric,
    pub baseline: f64,
    pub final_value: f64,
    pub restored: bool,
    /// Cycles after the perturbation ended until the metric first
    /// re-entered the tolerance band. `None` unless restored.
    pub recovery_time: Option<u32>,
}

fn tracked_value(record: &CycleMetrics, metric: TrackedMetric) -> Option<f64> {
    match metric {
        TrackedMetric::MeanPatternWeight => record.mean_pattern_weight(),
        TrackedMetric::TotalAgents => Some(record.total_agents as f64),
        TrackedMetric::MeanPopulationSize => Some(record.mean_population),
    }
}

fn samples<'a>(
    records: impl Iterator<Item = &'a CycleMetrics>,
    metric: TrackedMetric,
) -> Vec<(u32, f64)> {
    records
        .filter_map(|r| tracked_value(r, metric).map(|v| (r.cycle, v)))
        .collect()
}

/// Compares the tracked metric after `window` against its pre-window
/// baseline.
///
/// The baseline averages the last `baseline_window` records before
/// `window.start`; the final value averages the last `baseline_window`
/// records of the run. Returns `None` if either average has no samples.
pub fn assess_restoration(
    records: &[CycleMetrics],
    window: &Perturbation,
    config: &RestorationConfig,
) -> Option<RestorationReport> {
    let before = samples(records.iter().filter(|r| r.cycle < window.start), config.metric);
    let after = samples(records.iter().filter(|r| r.cycle >= window.end), config.metric);
    let take = config.baseline_window as usize;
    if before.is_empty() || after.is_empty() {
        return None;
    }

    let baseline_values: Vec<f64> =
        before.iter().rev().take(take).map(|(_, v)| *v).collect();
    let final_values: Vec<f64> = after.iter().rev().take(take).map(|(_, v)| *v).collect();
    let baseline = mean(&baseline_values);
    let final_value = mean(&final_values);

    let band = config.tolerance * baseline.abs();
    let within = |v: f64| (v - baseline).abs() <= band;

    let first_back = after
        .iter()
        .find(|(_, v)| within(*v))
        .map(|(cycle, _)| cycle - window.end);
    let restored = within(final_value) && first_back.is_some();

    Some(RestorationReport {
        metric: config.metric,
        baseline,
        final_value,
        restored,
        recovery_time: if restored { first_back } else { None },
    })
}
