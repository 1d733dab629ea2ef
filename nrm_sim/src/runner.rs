//! Scenario runner - builds engine configs for each scenario and judges runs.

use crate::scenarios::ScenarioId;

use nrm_core::{
    counter_delta, Basin, CancelToken, EngineConfig, HierarchyShape, MigrationScope,
    Perturbation, PerturbationEffect, RestorationConfig, RunOutcome, SimulationEngine, Topology,
};
use tracing::{debug, info};

/// Cluster size used by the CLUSTERED side of the topology comparison.
const CLUSTER_SIZE: usize = 5;

/// Carrying capacity of the suppression scenario. With its recharge no agent
/// starves, so the population sits at the cap and only the window moves the
/// composition rate.
const SUPPRESSION_CAPACITY: usize = 30;
const SUPPRESSION_RECHARGE: f64 = 2.0;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the run met the scenario's expectation
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Config of the primary run
    pub config: EngineConfig,

    /// Primary run (the clustered side for the topology comparison)
    pub outcome: RunOutcome,

    /// Reference run the primary is judged against, if any
    pub comparison: Option<RunOutcome>,
}

impl ScenarioResult {
    pub fn basin(&self) -> Basin {
        self.outcome.basin
    }

    pub fn cancelled(&self) -> bool {
        self.outcome.cancelled || self.comparison.as_ref().is_some_and(|c| c.cancelled)
    }
}

/// ISOLATED and CLUSTERED variants of `base`, in that order.
pub fn topology_pair(base: &EngineConfig, cluster_size: usize) -> (EngineConfig, EngineConfig) {
    let isolated = EngineConfig {
        topology: Topology::Isolated,
        ..base.clone()
    };
    let clustered = EngineConfig {
        topology: Topology::Grouped { size: cluster_size },
        ..base.clone()
    };
    (isolated, clustered)
}

/// Runs experiment scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Cycle count override
    cycles: Option<u32>,

    /// Parameters the scenario overrides are applied on top of
    base: EngineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            cycles: None,
            base: EngineConfig::default(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Overrides every scenario's cycle count.
    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = Some(cycles);
        self
    }

    /// Sets the parameters scenario overrides start from.
    pub fn with_base_config(mut self, config: EngineConfig) -> Self {
        self.base = config;
        self
    }

    /// Engine config of the scenario's primary run.
    pub fn config_for(&self, scenario: ScenarioId) -> EngineConfig {
        let mut config = self.base.clone().with_seed(self.seed);
        config.f_migrate = 0.0;

        match scenario {
            ScenarioId::SinglePopulation => {
                config.shape = HierarchyShape::single(10);
                config.topology = Topology::Isolated;
                config.f_intra = 0.025;
                config.cycles = 3000;
            }
            ScenarioId::TopologyComparison => {
                config.shape = HierarchyShape::flat(10, 10);
                config.topology = Topology::Grouped { size: CLUSTER_SIZE };
                config.f_intra = 0.025;
                config.energy_share = 0.5;
                config.cycles = 3000;
            }
            ScenarioId::Metapopulation => {
                config.shape = HierarchyShape::nested(3, 4, 10);
                config.topology = Topology::PerMetaPopulation;
                config.migration_scope = MigrationScope::SiblingGroup;
                config.f_intra = 0.025;
                config.f_migrate = 0.005;
                config.energy_share = 0.25;
                config.cycles = 3000;
            }
            ScenarioId::Suppression => {
                config.shape = HierarchyShape::single(10);
                config.topology = Topology::Isolated;
                config.f_intra = 0.025;
                config.max_population_size = Some(SUPPRESSION_CAPACITY);
                config.recharge_rate = SUPPRESSION_RECHARGE;
                config.cycles = 5000;
                config.perturbations = vec![Perturbation::suppression(2000, 2500, 0.5)];
                config.restoration = Some(RestorationConfig::default());
            }
            ScenarioId::NoHomeostasis => {
                config.shape = HierarchyShape::single(10);
                config.topology = Topology::Isolated;
                config.f_intra = 0.025;
                config.homeostasis = false;
                config.cycles = 3000;
            }
        }

        if let Some(cycles) = self.cycles {
            config.cycles = cycles;
        }
        config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, nrm_core::ConfigError> {
        self.run_with_cancel(scenario, &CancelToken::new())
    }

    /// Runs a scenario, stopping early once `cancel` is set.
    pub fn run_with_cancel(
        &self,
        scenario: ScenarioId,
        cancel: &CancelToken,
    ) -> Result<ScenarioResult, nrm_core::ConfigError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        let config = self.config_for(scenario);

        let (outcome, comparison) = match scenario {
            ScenarioId::TopologyComparison => {
                let (isolated, clustered) = topology_pair(&config, CLUSTER_SIZE);
                let reference = SimulationEngine::new(isolated)?.run_with_cancel(cancel);
                let primary = SimulationEngine::new(clustered)?.run_with_cancel(cancel);
                (primary, Some(reference))
            }
            _ => (SimulationEngine::new(config.clone())?.run_with_cancel(cancel), None),
        };

        let cancelled = outcome.cancelled || comparison.as_ref().is_some_and(|c| c.cancelled);
        let failure_reason = if cancelled {
            Some("cancelled".to_string())
        } else {
            judge(scenario, &config, &outcome, comparison.as_ref())
        };
        debug!(
            "  {} seed={} basin={} mean_population={:.2}",
            scenario.name(),
            self.seed,
            outcome.basin,
            outcome.final_mean_population
        );

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            failure_reason,
            config,
            outcome,
            comparison,
        })
    }
}

/// Returns why the run misses the scenario's expectation, if it does.
fn judge(
    scenario: ScenarioId,
    config: &EngineConfig,
    outcome: &RunOutcome,
    comparison: Option<&RunOutcome>,
) -> Option<String> {
    match scenario {
        ScenarioId::SinglePopulation | ScenarioId::Metapopulation => {
            (outcome.basin != Basin::A).then(|| {
                format!(
                    "collapsed to Basin B (mean population {:.2})",
                    outcome.final_mean_population
                )
            })
        }
        ScenarioId::TopologyComparison => {
            let isolated = comparison.map_or(0.0, |c| c.viable_fraction);
            (outcome.viable_fraction < isolated).then(|| {
                format!(
                    "clustered viability {:.2} below isolated {:.2}",
                    outcome.viable_fraction, isolated
                )
            })
        }
        ScenarioId::Suppression => judge_suppression(config, outcome),
        ScenarioId::NoHomeostasis => {
            let drift = outcome
                .records
                .last()
                .and_then(|r| r.mean_pattern_weight())
                .unwrap_or(0.0);
            (drift <= 1.0).then(|| format!("no weight drift (mean weight {:.4})", drift))
        }
    }
}

/// The window must block compositions, lower the composition rate against
/// the equally long stretch before it, and the tracked metric must recover.
fn judge_suppression(config: &EngineConfig, outcome: &RunOutcome) -> Option<String> {
    let Some(window) = config
        .perturbations
        .iter()
        .find(|p| matches!(p.effect, PerturbationEffect::CompositionSuppression { .. }))
    else {
        return Some("no suppression window configured".to_string());
    };
    if outcome.counters.suppressed_compositions == 0 {
        return Some("no composition was suppressed".to_string());
    }

    let before_start = window.start.saturating_sub(window.duration());
    let rate = |start, end| counter_delta(&outcome.records, start, end, |c| c.compositions);
    match (rate(before_start, window.start), rate(window.start, window.end)) {
        (Some(before), Some(during)) if during < before => {}
        (Some(before), Some(during)) => {
            return Some(format!(
                "composition rate not lowered: {} in window vs {} before",
                during, before
            ))
        }
        _ => return Some("no records around the suppression window".to_string()),
    }

    match &outcome.restoration {
        Some(report) if report.restored => None,
        Some(report) => Some(format!(
            "not restored: final {:.4} vs baseline {:.4}",
            report.final_value, report.baseline
        )),
        None => Some("no samples around the suppression window".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_configs_validate() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let config = runner.config_for(scenario);
            assert!(config.validate().is_ok(), "{} config invalid", scenario);
            assert_eq!(config.seed, 42);
        }
    }

    #[test]
    fn test_scenario_shapes() {
        let runner = ScenarioRunner::new(42);
        let single = runner.config_for(ScenarioId::SinglePopulation);
        assert_eq!(single.shape.population_count(), 1);
        assert_eq!(single.f_migrate, 0.0);
        assert_eq!(single.cycles, 3000);

        let meta = runner.config_for(ScenarioId::Metapopulation);
        assert_eq!(meta.shape.population_count(), 12);
        assert_eq!(meta.shape.depth(), 3);

        let suppression = runner.config_for(ScenarioId::Suppression);
        assert_eq!(suppression.cycles, 5000);
        assert_eq!(suppression.perturbations[0].duration(), 500);
        assert_eq!(suppression.max_population_size, Some(SUPPRESSION_CAPACITY));
        assert_eq!(suppression.recharge_rate, SUPPRESSION_RECHARGE);

        // Only the suppression scenario sets a carrying capacity
        assert_eq!(single.max_population_size, None);
        assert_eq!(meta.max_population_size, None);
    }

    #[test]
    fn test_cycles_override() {
        let runner = ScenarioRunner::new(1).with_cycles(50);
        assert!(ScenarioId::all()
            .into_iter()
            .all(|s| runner.config_for(s).cycles == 50));
    }

    #[test]
    fn test_same_seed_same_result() {
        let runner = ScenarioRunner::new(42).with_cycles(200);
        let a = runner.run(ScenarioId::SinglePopulation).unwrap();
        let b = runner.run(ScenarioId::SinglePopulation).unwrap();
        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.passed, b.passed);
    }

    #[test]
    fn test_topology_comparison_runs_both_sides() {
        let result = ScenarioRunner::new(42)
            .with_cycles(100)
            .run(ScenarioId::TopologyComparison)
            .unwrap();
        let reference = result.comparison.expect("isolated reference run");
        assert_eq!(reference.cycles_completed, 100);
        assert!(matches!(result.config.topology, Topology::Grouped { size: 5 }));
    }

    #[test]
    fn test_topology_comparison_seed_42_clustered_not_worse() {
        let result = ScenarioRunner::new(42)
            .run(ScenarioId::TopologyComparison)
            .unwrap();
        let isolated = result.comparison.as_ref().unwrap();
        assert_eq!(result.outcome.cycles_completed, 3000);
        assert_eq!(isolated.cycles_completed, 3000);
        assert!(
            result.outcome.viable_fraction >= isolated.viable_fraction,
            "clustered {} vs isolated {}",
            result.outcome.viable_fraction,
            isolated.viable_fraction
        );
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_suppression_scenario_blocks_and_slows_compositions() {
        let result = ScenarioRunner::new(42).run(ScenarioId::Suppression).unwrap();
        let outcome = &result.outcome;
        assert!(outcome.counters.suppressed_compositions > 0);

        let compositions =
            |start, end| counter_delta(&outcome.records, start, end, |c| c.compositions).unwrap();
        let before = compositions(1500, 2000);
        let during = compositions(2000, 2500);
        let after = compositions(2500, 3000);
        assert!(during < before, "{} in window vs {} before", during, before);
        assert!(during < after, "{} in window vs {} after", during, after);
        assert!(outcome.restoration.is_some());
    }

    #[test]
    fn test_suppression_judge_rejects_unblocked_run() {
        let config = ScenarioRunner::new(42).with_cycles(50).config_for(ScenarioId::Suppression);
        let outcome = SimulationEngine::new(config.clone()).unwrap().run();
        assert_eq!(outcome.counters.suppressed_compositions, 0);
        assert_eq!(
            judge_suppression(&config, &outcome).as_deref(),
            Some("no composition was suppressed")
        );
    }

    #[test]
    fn test_pooling_never_lowers_viability_without_losses() {
        // No spawning, no composition cost: every population keeps 10 agents
        let base = EngineConfig {
            shape: HierarchyShape::flat(10, 10),
            f_intra: 0.0,
            composition_energy_delta: 0.0,
            energy_share: 0.5,
            cycles: 200,
            ..Default::default()
        };
        let (isolated, clustered) = topology_pair(&base, 5);
        let iso = SimulationEngine::new(isolated).unwrap().run();
        let clu = SimulationEngine::new(clustered).unwrap().run();
        assert!(clu.viable_fraction >= iso.viable_fraction);
        assert_eq!(clu.basin, Basin::A);
    }

    #[test]
    fn test_cancelled_run_fails() {
        let token = CancelToken::new();
        token.cancel();
        let result = ScenarioRunner::new(3)
            .run_with_cancel(ScenarioId::SinglePopulation, &token)
            .unwrap();
        assert!(!result.passed);
        assert!(result.cancelled());
        assert_eq!(result.outcome.cycles_completed, 0);
        assert_eq!(result.failure_reason.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_invalid_base_config_is_rejected() {
        let base = EngineConfig {
            e_initial: 100.0,
            ..Default::default()
        };
        let runner = ScenarioRunner::new(1).with_base_config(base);
        assert!(runner.run(ScenarioId::SinglePopulation).is_err());
    }
}
