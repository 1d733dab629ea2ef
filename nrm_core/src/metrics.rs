//! Metrics Module
//! ==============
//!
//! Per-cycle records handed to external analysis:
//! - **Population statistics**: mean, median and coefficient of variation
//!   of population sizes
//! - **Event counters**: cumulative spawn, migration, composition,
//!   decomposition and pruning totals
//! - **Pattern statistics**: mean weight, weight CV and Shannon entropy of
//!   normalized pattern weights, averaged over agents holding patterns

use crate::hierarchy::Hierarchy;
use serde::{Deserialize, Serialize};

// =============================================================================
// COUNTERS
// =============================================================================

/// Events of a single `step()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub cycle: u32,
    pub spawn_attempts: u64,
    pub spawned: u64,
    /// Parent below the spawn threshold.
    pub spawn_failures: u64,
    /// Population already at `max_population_size`.
    pub capacity_rejections: u64,
    pub migration_attempts: u64,
    pub migrations: u64,
    pub migration_failures: u64,
    pub compositions: u64,
    pub suppressed_compositions: u64,
    pub decompositions: u64,
    pub pruned: u64,
    pub scaled: bool,
}

/// Running totals over the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub spawn_attempts: u64,
    pub spawn_successes: u64,
    pub spawn_failures: u64,
    pub capacity_rejections: u64,
    pub migration_attempts: u64,
    pub migrations: u64,
    pub migration_failures: u64,
    pub compositions: u64,
    pub suppressed_compositions: u64,
    pub decompositions: u64,
    pub pruned: u64,
    pub scaling_events: u64,
}

impl RunCounters {
    pub fn absorb(&mut self, step: &StepReport) {
        self.spawn_attempts += step.spawn_attempts;
        self.spawn_successes += step.spawned;
        self.spawn_failures += step.spawn_failures;
        self.capacity_rejections += step.capacity_rejections;
        self.migration_attempts += step.migration_attempts;
        self.migrations += step.migrations;
        self.migration_failures += step.migration_failures;
        self.compositions += step.compositions;
        self.suppressed_compositions += step.suppressed_compositions;
        self.decompositions += step.decompositions;
        self.pruned += step.pruned;
        if step.scaled {
            self.scaling_events += 1;
        }
    }
}

// =============================================================================
// SNAPSHOT RECORD
// =============================================================================

/// Aggregate pattern-memory statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    /// Mean weight over every pattern of every agent.
    pub mean_weight: f64,
    /// Mean over agents of the CV of their pattern weights.
    pub mean_weight_cv: f64,
    /// Mean over agents of the Shannon entropy (nats) of normalized weights.
    pub mean_entropy: f64,
}

/// One metrics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub cycle: u32,
    pub total_agents: usize,
    pub mean_population: f64,
    pub median_population: f64,
    pub cv_population: f64,
    pub total_energy: f64,
    pub counters: RunCounters,
    /// `None` when pattern tracking is off or no agent holds a pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<PatternStats>,
}

impl CycleMetrics {
    /// Captures the hierarchy state at the end of `cycle`.
    pub fn capture(
        cycle: u32,
        hierarchy: &Hierarchy,
        counters: RunCounters,
        track_patterns: bool,
    ) -> Self {
        let sizes: Vec<f64> = hierarchy.sizes().into_iter().map(|s| s as f64).collect();
        Self {
            cycle,
            total_agents: hierarchy.total_agents(),
            mean_population: mean(&sizes),
            median_population: median(&sizes),
            cv_population: coefficient_of_variation(&sizes),
            total_energy: hierarchy.total_energy(),
            counters,
            patterns: if track_patterns { pattern_stats(hierarchy) } else { None },
        }
    }

    pub fn mean_pattern_weight(&self) -> Option<f64> {
        self.patterns.map(|p| p.mean_weight)
    }
}

/// Growth of a cumulative counter over cycles `[start, end)`.
///
/// Reads the last record before `start` (zero if none) and the last record
/// before `end`. `None` when no record falls inside the window.
pub fn counter_delta(
    records: &[CycleMetrics],
    start: u32,
    end: u32,
    counter: impl Fn(&RunCounters) -> u64,
) -> Option<u64> {
    let before = records
        .iter()
        .rev()
        .find(|r| r.cycle < start)
        .map_or(0, |r| counter(&r.counters));
    let last = records.iter().rev().find(|r| r.cycle < end && r.cycle >= start)?;
    Some(counter(&last.counters).saturating_sub(before))
}

/// Pattern statistics across all agents holding at least one pattern.
pub fn pattern_stats(hierarchy: &Hierarchy) -> Option<PatternStats> {
    let mut weight_total = 0.0;
    let mut pattern_total = 0usize;
    let mut cv_sum = 0.0;
    let mut entropy_sum = 0.0;
    let mut holders = 0usize;

    for agent in hierarchy.agents() {
        let weights: Vec<f64> = agent.patterns().map(|p| p.weight).collect();
        if weights.is_empty() {
            continue;
        }
        weight_total += weights.iter().sum::<f64>();
        pattern_total += weights.len();
        cv_sum += coefficient_of_variation(&weights);
        entropy_sum += shannon_entropy(&weights);
        holders += 1;
    }

    if holders == 0 {
        return None;
    }
    Some(PatternStats {
        mean_weight: weight_total / pattern_total as f64,
        mean_weight_cv: cv_sum / holders as f64,
        mean_entropy: entropy_sum / holders as f64,
    })
}

// =============================================================================
// STATISTICS
// =============================================================================

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// `std / mean`; zero when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        0.0
    } else {
        std_dev(values) / m
    }
}

/// Shannon entropy in nats of the distribution `w / sum(w)`.
///
/// ```text
/// H = -Σ p_i ln p_i
/// ```
pub fn shannon_entropy(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return 0.0;
    }
    -weights
        .iter()
        .filter(|w| **w > 0.0)
        .map(|w| {
            let p = w / total;
            p * p.ln()
        })
        .sum::<f64>()
}
