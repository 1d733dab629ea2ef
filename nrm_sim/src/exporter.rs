//! JSON exporter for run records.
//!
//! Exports each scenario run as a self-describing document for external
//! analysis: parameters, the metrics record sequence and the final verdict.

use crate::error::SimError;
use crate::runner::ScenarioResult;

use nrm_core::constants::SEED_MIX_B;
use nrm_core::{Basin, CycleMetrics, EngineConfig, RestorationReport, RunCounters};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Deterministic run identifier for a `(scenario, seed)` pair.
pub fn run_id(scenario: &str, seed: u64) -> Uuid {
    // FNV-1a over the scenario name keeps ids stable across builds
    let salt = scenario
        .bytes()
        .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
    let mixed = seed ^ salt;
    let mut bytes = [0u8; 16];
    bytes[0..8].copy_from_slice(&mixed.to_le_bytes());
    bytes[8..16].copy_from_slice(&mixed.wrapping_mul(SEED_MIX_B).to_le_bytes());
    Uuid::from_bytes(bytes)
}

/// Summary of a reference run (the ISOLATED side of a topology comparison).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub basin: Basin,
    pub final_mean_population: f64,
    pub viable_fraction: f64,
    pub counters: RunCounters,
}

/// Complete export of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    /// Deterministic id, stable for the same scenario and seed
    pub run_id: Uuid,

    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Full parameter set
    pub config: EngineConfig,

    /// Metrics records in cycle order
    pub records: Vec<CycleMetrics>,

    pub cycles_completed: u32,
    pub cancelled: bool,
    pub basin: Basin,
    pub final_mean_population: f64,
    pub viable_fraction: f64,
    pub counters: RunCounters,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restoration: Option<RestorationReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonSummary>,

    /// Final verdict
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl RunExport {
    pub fn from_result(result: &ScenarioResult) -> Self {
        let outcome = &result.outcome;
        Self {
            run_id: run_id(result.scenario.name(), result.seed),
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            config: result.config.clone(),
            records: outcome.records.clone(),
            cycles_completed: outcome.cycles_completed,
            cancelled: outcome.cancelled,
            basin: outcome.basin,
            final_mean_population: outcome.final_mean_population,
            viable_fraction: outcome.viable_fraction,
            counters: outcome.counters,
            restoration: outcome.restoration,
            comparison: result.comparison.as_ref().map(|c| ComparisonSummary {
                basin: c.basin,
                final_mean_population: c.final_mean_population,
                viable_fraction: c.viable_fraction,
                counters: c.counters,
            }),
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
        }
    }
}

/// Writes `exports` as a pretty-printed JSON array.
pub fn write_to_file(exports: &[RunExport], path: &Path) -> Result<(), SimError> {
    let json = serde_json::to_string_pretty(exports)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_run_id_is_deterministic() {
        assert_eq!(run_id("suppression", 42), run_id("suppression", 42));
        assert_ne!(run_id("suppression", 42), run_id("suppression", 43));
        assert_ne!(run_id("suppression", 42), run_id("metapopulation", 42));
    }

    #[test]
    fn test_export_from_result() {
        let result = ScenarioRunner::new(42)
            .with_cycles(50)
            .run(ScenarioId::TopologyComparison)
            .unwrap();
        let export = RunExport::from_result(&result);
        assert_eq!(export.scenario, "topology_comparison");
        assert_eq!(export.records.len(), 50);
        assert!(export.comparison.is_some());

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["seed"], 42);
        assert_eq!(json["config"]["topology"]["kind"], "grouped");
        assert!(json.get("restoration").is_none());
    }

    #[test]
    fn test_write_to_file() {
        let result = ScenarioRunner::new(1)
            .with_cycles(20)
            .run(ScenarioId::SinglePopulation)
            .unwrap();
        let path = std::env::temp_dir().join(format!("nrm-export-{}.json", run_id("test", 1)));
        write_to_file(&[RunExport::from_result(&result)], &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<RunExport> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].cycles_completed, 20);
        std::fs::remove_file(&path).ok();
    }
}
