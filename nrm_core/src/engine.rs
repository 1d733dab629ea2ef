//! SimulationEngine - the per-cycle state machine.
//!
//! One engine owns one run: its config, its hierarchy, and its only RNG.
//! `step()` executes the seven phases in a fixed order; every random draw
//! happens in a fixed iteration order (populations by id, agents by index),
//! so the same `(config, seed)` always produces bit-identical records.
//!
//! ```text
//! step():
//!   1. spawn        stochastic-rounded attempts per population
//!   2. migrate      stochastic-rounded attempts per migration scope
//!   3. recover      per-cluster pooled recharge from a pre-step snapshot
//!   4. resonate     pairwise composition / decomposition per population
//!   5. scale        homeostatic weight scaling every SCALING_INTERVAL
//!   6. prune        living cost, then drop agents below the floor
//!   7. snapshot     metrics record every snapshot_interval cycles
//! ```

use crate::agent::{Agent, AgentId, Pattern};
use crate::basin::{assess_restoration, Basin, BasinClassifier, RestorationReport};
use crate::config::{EngineConfig, MigrationGate, PerturbationEffect};
use crate::error::ConfigError;
use crate::hierarchy::Hierarchy;
use crate::metrics::{CycleMetrics, RunCounters, StepReport};
use crate::phase::{PhaseInput, PhaseMapper};
use crate::population::PopulationId;
use crate::rng::create_rng;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cycles between progress log lines in `run()`.
const PROGRESS_LOG_INTERVAL: u32 = 500;

/// Cooperative stop request shared between a driver and running engines.
///
/// The engine checks it between cycles, so a cancelled run still ends on a
/// self-consistent cycle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a finished (or cancelled) run hands to analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub seed: u64,
    pub cycles_completed: u32,
    pub cancelled: bool,
    pub records: Vec<CycleMetrics>,
    pub counters: RunCounters,
    /// Mean population size per population at the last cycle.
    pub final_mean_population: f64,
    pub basin: Basin,
    /// Share of populations individually in Basin A at the last cycle.
    pub viable_fraction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restoration: Option<RestorationReport>,
}

/// Draws `floor(x) + Bernoulli(frac(x))`.
///
/// No draw is made when `x` is integral, so zero rates consume no entropy.
fn stochastic_round<R: Rng>(x: f64, rng: &mut R) -> u64 {
    let whole = x.floor();
    let frac = x - whole;
    let extra = if frac > 0.0 && rng.gen::<f64>() < frac { 1 } else { 0 };
    whole as u64 + extra
}

pub struct SimulationEngine {
    config: EngineConfig,
    hierarchy: Hierarchy,
    mapper: PhaseMapper,
    classifier: BasinClassifier,
    rng: ChaCha8Rng,
    noise: Normal<f64>,
    counters: RunCounters,
    records: Vec<CycleMetrics>,
    cycle: u32,
    next_agent_id: u64,
}

impl SimulationEngine {
    /// Validates `config` and seeds the founding populations.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut hierarchy = Hierarchy::new(&config.shape, &config.topology)?;
        let mapper = PhaseMapper::new(config.phase_distance);
        let noise = Normal::new(0.0, config.phase_noise_std).map_err(|_| {
            ConfigError::NegativeParameter {
                name: "phase_noise_std",
                value: config.phase_noise_std,
            }
        })?;

        let mut next_agent_id = 0u64;
        for pop in hierarchy.populations_mut() {
            for _ in 0..config.shape.agents_per_population {
                let id = AgentId(next_agent_id);
                next_agent_id += 1;
                let phase = mapper.map(PhaseInput::Seeded {
                    seed: config.seed,
                    counter: id.0,
                });
                pop.insert(Agent::new(id, config.e_initial, phase));
            }
        }

        info!(
            "Engine ready: seed={} populations={} depth={} agents={}",
            config.seed,
            hierarchy.population_count(),
            config.shape.depth(),
            hierarchy.total_agents()
        );

        Ok(Self {
            classifier: BasinClassifier::new(config.viability_threshold),
            rng: create_rng(config.seed),
            config,
            hierarchy,
            mapper,
            noise,
            counters: RunCounters::default(),
            records: Vec::new(),
            cycle: 0,
            next_agent_id,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Mutable access for tests and external perturbation drivers.
    pub fn hierarchy_mut(&mut self) -> &mut Hierarchy {
        &mut self.hierarchy
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn records(&self) -> &[CycleMetrics] {
        &self.records
    }

    pub fn classifier(&self) -> &BasinClassifier {
        &self.classifier
    }

    /// Metrics for the current state without recording them.
    pub fn snapshot(&self) -> CycleMetrics {
        CycleMetrics::capture(
            self.cycle,
            &self.hierarchy,
            self.counters,
            self.config.pattern_capacity > 0,
        )
    }

    /// Advances one cycle.
    pub fn step(&mut self) -> StepReport {
        self.cycle += 1;
        let mut report = StepReport {
            cycle: self.cycle,
            ..Default::default()
        };

        self.spawn_phase(&mut report);
        self.migration_phase(&mut report);
        self.recovery_phase();
        self.resonance_phase(&mut report);
        if self.config.scaling_due(self.cycle) {
            self.scaling_phase();
            report.scaled = true;
        }
        self.prune_phase(&mut report);

        self.counters.absorb(&report);
        debug_assert!(
            self.hierarchy.membership_is_exclusive(),
            "agent held by two populations at cycle {}",
            self.cycle
        );

        if self.cycle % self.config.snapshot_interval == 0 {
            self.records.push(self.snapshot());
        }
        report
    }

    /// Runs the remaining configured cycles.
    pub fn run(&mut self) -> RunOutcome {
        self.run_until(None)
    }

    /// Runs the remaining configured cycles, stopping early once `cancel`
    /// is set.
    pub fn run_with_cancel(&mut self, cancel: &CancelToken) -> RunOutcome {
        self.run_until(Some(cancel))
    }

    fn run_until(&mut self, cancel: Option<&CancelToken>) -> RunOutcome {
        info!(
            "Run start: seed={} cycles={} (at cycle {})",
            self.config.seed, self.config.cycles, self.cycle
        );
        let mut cancelled = false;

        while self.cycle < self.config.cycles {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                warn!("Run cancelled after cycle {}", self.cycle);
                cancelled = true;
                break;
            }
            self.step();
            if self.cycle % PROGRESS_LOG_INTERVAL == 0 {
                debug!(
                    "  cycle={} | agents={} | compositions={} | spawns={}",
                    self.cycle,
                    self.hierarchy.total_agents(),
                    self.counters.compositions,
                    self.counters.spawn_successes
                );
            }
        }

        let outcome = self.outcome(cancelled);
        info!(
            "Run end: seed={} cycles={} agents={} basin={}",
            outcome.seed,
            outcome.cycles_completed,
            self.hierarchy.total_agents(),
            outcome.basin
        );
        outcome
    }

    /// Packages the current state. Appends a final record if the last cycle
    /// fell between snapshot intervals.
    fn outcome(&mut self, cancelled: bool) -> RunOutcome {
        if self.records.last().map(|r| r.cycle) != Some(self.cycle) {
            self.records.push(self.snapshot());
        }
        let final_mean_population = self
            .records
            .last()
            .map(|r| r.mean_population)
            .unwrap_or_default();

        let restoration = match (&self.config.restoration, self.config.perturbations.first()) {
            (Some(check), Some(window)) if !cancelled => {
                assess_restoration(&self.records, window, check)
            }
            _ => None,
        };

        RunOutcome {
            seed: self.config.seed,
            cycles_completed: self.cycle,
            cancelled,
            records: self.records.clone(),
            counters: self.counters,
            final_mean_population,
            basin: self.classifier.classify(final_mean_population),
            viable_fraction: self.classifier.viable_fraction(&self.hierarchy.sizes()),
            restoration,
        }
    }

    // =========================================================================
    // PHASES
    // =========================================================================

    fn active_effects(&self) -> impl Iterator<Item = PerturbationEffect> + '_ {
        let cycle = self.cycle;
        self.config
            .perturbations
            .iter()
            .filter(move |p| p.is_active(cycle))
            .map(|p| p.effect)
    }

    /// 1. Intra-population spawning.
    fn spawn_phase(&mut self, report: &mut StepReport) {
        let Self {
            config,
            hierarchy,
            mapper,
            rng,
            noise,
            next_agent_id,
            ..
        } = self;
        if config.f_intra == 0.0 {
            return;
        }

        for pop in hierarchy.populations_mut() {
            let attempts = stochastic_round(pop.len() as f64 * config.f_intra, rng);
            for _ in 0..attempts {
                report.spawn_attempts += 1;
                let parent_idx = rng.gen_range(0..pop.len());
                if config.max_population_size.is_some_and(|max| pop.len() >= max) {
                    report.capacity_rejections += 1;
                    continue;
                }
                if pop.agents[parent_idx].energy() < config.e_spawn_threshold {
                    report.spawn_failures += 1;
                    continue;
                }

                let parent = &mut pop.agents[parent_idx];
                parent.adjust_energy(-config.e_spawn_cost, config.e_cap);
                let z = [noise.sample(rng), noise.sample(rng), noise.sample(rng)];
                let phase = mapper.jitter(&parent.phase, z);
                let child = Agent::spawn_child(
                    parent,
                    AgentId(*next_agent_id),
                    0.5 * config.e_initial,
                    phase,
                );
                *next_agent_id += 1;
                pop.insert(child);
                report.spawned += 1;
            }
        }
    }

    /// 2. Inter-population migration.
    fn migration_phase(&mut self, report: &mut StepReport) {
        let Self {
            config,
            hierarchy,
            rng,
            ..
        } = self;
        if config.f_migrate == 0.0 {
            return;
        }

        for group in hierarchy.migration_groups(config.migration_scope) {
            let total: usize = group.iter().map(|p| hierarchy.population(*p).len()).sum();
            let attempts = stochastic_round(total as f64 * config.f_migrate, rng);

            for _ in 0..attempts {
                report.migration_attempts += 1;
                let eligible: Vec<PopulationId> = group
                    .iter()
                    .copied()
                    .filter(|id| {
                        let pop = hierarchy.population(*id);
                        let gate = match config.migration_gate {
                            MigrationGate::Population => pop.total_energy(),
                            MigrationGate::Cluster => hierarchy.cluster_energy(pop.cluster_id),
                        };
                        !pop.is_empty() && gate >= config.e_migrate_threshold
                    })
                    .collect();
                if eligible.is_empty() {
                    report.migration_failures += 1;
                    continue;
                }

                let source = eligible[rng.gen_range(0..eligible.len())];
                let destinations: Vec<PopulationId> =
                    group.iter().copied().filter(|p| *p != source).collect();
                let dest = destinations[rng.gen_range(0..destinations.len())];
                let index = rng.gen_range(0..hierarchy.population(source).len());
                hierarchy.move_agent(source, index, dest);
                report.migrations += 1;
            }
        }
    }

    /// 3. Energy recovery, pooled per cluster.
    ///
    /// Each agent keeps `(1 - share)` of its pre-step energy and receives an
    /// equal slice of the pool (`share` of every member's energy plus the
    /// cluster's recharge budget). The pool is summed before any agent is
    /// written, so the result does not depend on member order.
    fn recovery_phase(&mut self) {
        let scale: f64 = self
            .active_effects()
            .map(|e| match e {
                PerturbationEffect::RechargeScale { factor } => factor,
                _ => 1.0,
            })
            .product();
        let recharge = self.config.recharge_rate * scale;
        let share = self.config.energy_share;
        let cap = self.config.e_cap;

        let clusters: Vec<Vec<PopulationId>> = self
            .hierarchy
            .clusters()
            .iter()
            .map(|c| c.members.iter().copied().collect())
            .collect();

        for members in clusters {
            let (count, pooled) = members
                .iter()
                .flat_map(|p| self.hierarchy.population(*p).agents.iter())
                .fold((0usize, 0.0f64), |(n, sum), a| (n + 1, sum + a.energy() * share));
            if count == 0 {
                continue;
            }
            let per_agent = recharge + pooled / count as f64;

            for pop_id in &members {
                for agent in self.hierarchy.population_mut(*pop_id).agents.iter_mut() {
                    let kept = agent.energy() * (1.0 - share);
                    agent.set_energy(kept + per_agent, cap);
                }
            }
        }
    }

    /// 4. Phase drift, then composition / decomposition detection.
    ///
    /// Every agent first advances along its own mapper-assigned velocity.
    /// Agent `i` then scans partners `j > i`; the first resonant partner ends
    /// the scan (at most one composition initiated per agent per cycle). A
    /// suppressed composition also ends the scan and still separates the
    /// pair, so a blocked event is lost rather than retried until it passes.
    fn resonance_phase(&mut self, report: &mut StepReport) {
        let suppression = self
            .active_effects()
            .filter_map(|e| match e {
                PerturbationEffect::CompositionSuppression { fraction } => Some(fraction),
                _ => None,
            })
            .fold(0.0f64, f64::max);
        let base_events = self.counters.compositions;

        let Self {
            config,
            hierarchy,
            mapper,
            rng,
            ..
        } = self;
        let cap = config.e_cap;
        let step = config.composition_phase_step;

        if config.phase_drift_rate > 0.0 {
            for agent in hierarchy.agents_mut() {
                agent.phase = mapper.drift(&agent.phase, agent.id.0, config.phase_drift_rate);
            }
        }

        for pop in hierarchy.populations_mut() {
            let n = pop.agents.len();
            for i in 0..n {
                for j in (i + 1)..n {
                    let d = mapper.distance(&pop.agents[i].phase, &pop.agents[j].phase);

                    if d < config.theta_comp {
                        let blocked = suppression > 0.0 && rng.gen::<f64>() < suppression;
                        let value = mapper.scalar(PhaseInput::Counter(
                            base_events + report.compositions,
                        ));
                        let (left, right) = pop.agents.split_at_mut(j);
                        let (a, b) = (&mut left[i], &mut right[0]);
                        for (agent, direction) in [(a, 1.0), (b, -1.0)] {
                            agent.phase = mapper.nudge(&agent.phase, direction * step);
                            if blocked {
                                continue;
                            }
                            agent.composition_count += 1;
                            agent.adjust_energy(config.composition_energy_delta, cap);
                            agent.potentiate(config.potentiation_rate);
                            agent.record_pattern(Pattern::new(value), config.pattern_capacity);
                        }
                        if blocked {
                            report.suppressed_compositions += 1;
                        } else {
                            report.compositions += 1;
                        }
                        break;
                    } else if d >= config.theta_decomp {
                        let gain = config.decomposition_energy_gain;
                        pop.agents[i].adjust_energy(gain, cap);
                        pop.agents[j].adjust_energy(gain, cap);
                        report.decompositions += 1;
                    }
                }
            }
        }
    }

    /// 5. Homeostatic pattern-weight scaling.
    fn scaling_phase(&mut self) {
        let target = self.config.target_weight_sum;
        for agent in self.hierarchy.agents_mut() {
            agent.scale_weights(target);
        }
    }

    /// 6. Living cost and pruning.
    fn prune_phase(&mut self, report: &mut StepReport) {
        let drain: f64 = self.config.living_cost
            + self
                .active_effects()
                .map(|e| match e {
                    PerturbationEffect::EnergyDrain { amount } => amount,
                    _ => 0.0,
                })
                .sum::<f64>();
        let cap = self.config.e_cap;
        if drain > 0.0 {
            for agent in self.hierarchy.agents_mut() {
                agent.adjust_energy(-drain, cap);
            }
        }

        let before = self.hierarchy.total_agents();
        let floor = self.config.viability_floor;
        report.pruned = self
            .hierarchy
            .populations_mut()
            .iter_mut()
            .map(|p| p.prune(floor) as u64)
            .sum();

        if before > 0 && self.hierarchy.total_agents() == 0 {
            warn!("All populations extinct at cycle {}", self.cycle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        HierarchyShape, MigrationScope, Perturbation, RestorationConfig, Topology, TrackedMetric,
    };
    use crate::metrics::counter_delta;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    /// Small, fast configuration with every mechanism active.
    fn busy_config(seed: u64) -> EngineConfig {
        EngineConfig {
            seed,
            cycles: 200,
            shape: HierarchyShape::nested(2, 3, 8),
            topology: Topology::Paired,
            migration_scope: MigrationScope::Global,
            max_population_size: Some(30),
            f_intra: 0.05,
            f_migrate: 0.02,
            energy_share: 0.2,
            living_cost: 0.1,
            scaling_interval: 10,
            ..Default::default()
        }
    }

    /// All rates zero, no resonance events, no homeostasis.
    fn quiet_config() -> EngineConfig {
        EngineConfig {
            cycles: 100,
            shape: HierarchyShape::flat(3, 5),
            f_intra: 0.0,
            f_migrate: 0.0,
            theta_comp: 0.0,
            theta_decomp: 6.0,
            phase_drift_rate: 0.0,
            homeostasis: false,
            viability_floor: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_founders_seeded() {
        let engine = SimulationEngine::new(busy_config(42)).unwrap();
        assert_eq!(engine.hierarchy().total_agents(), 48);
        assert!(engine
            .hierarchy()
            .agents()
            .all(|a| a.depth == 0 && a.energy() == engine.config().e_initial));
        assert!(engine.hierarchy().membership_is_exclusive());
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = EngineConfig {
            shape: HierarchyShape::flat(0, 5),
            ..Default::default()
        };
        assert!(SimulationEngine::new(config).is_err());
    }

    #[test]
    fn test_determinism_bit_identical() {
        let a = SimulationEngine::new(busy_config(42)).unwrap().run();
        let b = SimulationEngine::new(busy_config(42)).unwrap().run();
        assert_eq!(a, b);
        assert_eq!(a.records.len(), 200);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let a = SimulationEngine::new(busy_config(1)).unwrap().run();
        let b = SimulationEngine::new(busy_config(2)).unwrap().run();
        assert_ne!(a.records, b.records);
    }

    #[test]
    fn test_conservation_per_step() {
        let mut engine = SimulationEngine::new(busy_config(7)).unwrap();
        for _ in 0..150 {
            let before = engine.hierarchy().total_agents() as i64;
            let report = engine.step();
            let after = engine.hierarchy().total_agents() as i64;
            assert_eq!(after, before + report.spawned as i64 - report.pruned as i64);
            assert_eq!(
                report.spawn_attempts,
                report.spawned + report.spawn_failures + report.capacity_rejections
            );
            assert_eq!(
                report.migration_attempts,
                report.migrations + report.migration_failures
            );
        }
    }

    #[test]
    fn test_migration_alone_preserves_count() {
        let config = EngineConfig {
            f_migrate: 0.2,
            ..quiet_config()
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        let mut moved = 0;
        for _ in 0..50 {
            moved += engine.step().migrations;
            assert_eq!(engine.hierarchy().total_agents(), 15);
            assert!(engine.hierarchy().membership_is_exclusive());
        }
        assert!(moved > 0);
    }

    #[test]
    fn test_idempotent_no_op() {
        let mut engine = SimulationEngine::new(quiet_config()).unwrap();
        let cap = engine.config().e_cap;
        let recharge = engine.config().recharge_rate;
        let phases: Vec<_> = engine.hierarchy().agents().map(|a| a.phase).collect();
        for _ in 0..100 {
            let before: Vec<f64> = engine.hierarchy().agents().map(Agent::energy).collect();
            let report = engine.step();
            let after: Vec<f64> = engine.hierarchy().agents().map(Agent::energy).collect();
            assert_eq!(report.spawned + report.pruned + report.compositions, 0);
            assert_eq!(after.len(), before.len());
            assert!(engine.hierarchy().agents().map(|a| a.phase).eq(phases.iter().copied()));
            for (b, a) in before.iter().zip(&after) {
                assert_eq!(*a, (b + recharge).min(cap));
            }
        }
    }

    #[test]
    fn test_energy_bounds_every_cycle() {
        let mut engine = SimulationEngine::new(busy_config(11)).unwrap();
        let cap = engine.config().e_cap;
        for _ in 0..200 {
            engine.step();
            assert!(engine
                .hierarchy()
                .agents()
                .all(|a| a.energy() >= 0.0 && a.energy() <= cap));
        }
    }

    #[test]
    fn test_homeostatic_convergence_after_scaling() {
        let mut engine = SimulationEngine::new(busy_config(3)).unwrap();
        let target = engine.config().target_weight_sum;
        let mut scaled_with_patterns = false;
        for _ in 0..100 {
            let report = engine.step();
            if !report.scaled {
                continue;
            }
            // Agents spawned after the scaling have no patterns; pruning
            // only removes agents. Every survivor holding patterns is scaled.
            for agent in engine.hierarchy().agents().filter(|a| a.pattern_count() > 0) {
                assert_abs_diff_eq!(agent.weight_sum(), target, epsilon = 1e-9);
                scaled_with_patterns = true;
            }
        }
        assert!(scaled_with_patterns);
    }

    #[test]
    fn test_isolated_pool_equals_flat_recharge() {
        // Sharing inside a singleton cluster of one agent changes nothing
        let config = EngineConfig {
            shape: HierarchyShape::single(1),
            energy_share: 0.5,
            ..quiet_config()
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        engine.step();
        assert_abs_diff_eq!(
            engine.hierarchy().agents().next().unwrap().energy(),
            10.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_cluster_sharing_is_order_independent() {
        let config = EngineConfig {
            shape: HierarchyShape::flat(2, 2),
            topology: Topology::Global,
            energy_share: 1.0,
            ..quiet_config()
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        let energies = [2.0, 4.0, 6.0, 8.0];
        for (agent, e) in engine.hierarchy_mut().agents_mut().zip(energies) {
            agent.set_energy(e, 50.0);
        }
        engine.step();
        // Full sharing: everyone gets mean(2,4,6,8) + recharge
        for agent in engine.hierarchy().agents() {
            assert_abs_diff_eq!(agent.energy(), 5.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_one_composition_per_initiator() {
        // Everyone shares a phase: agent i composes with i+1 only
        let config = EngineConfig {
            shape: HierarchyShape::single(4),
            theta_comp: 1.0,
            composition_phase_step: 0.0,
            ..quiet_config()
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        let phase = engine.hierarchy().agents().next().unwrap().phase;
        for agent in engine.hierarchy_mut().agents_mut() {
            agent.phase = phase;
        }
        let report = engine.step();
        // i = 0, 1, 2 each initiate once; i = 3 has no partners
        assert_eq!(report.compositions, 3);
        let counts: Vec<u32> = engine
            .hierarchy()
            .agents()
            .map(|a| a.composition_count)
            .collect();
        assert_eq!(counts, vec![1, 2, 2, 1]);
    }

    #[test]
    fn test_full_suppression_blocks_all_compositions() {
        let config = EngineConfig {
            perturbations: vec![Perturbation::suppression(1, 50, 1.0)],
            ..busy_config(5)
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        let phase = engine.hierarchy().agents().next().unwrap().phase;
        for agent in engine.hierarchy_mut().agents_mut() {
            agent.phase = phase;
        }
        for _ in 0..49 {
            let report = engine.step();
            assert_eq!(report.compositions, 0);
        }
        assert!(engine.counters().suppressed_compositions > 0);
    }

    #[test]
    fn test_cancel_yields_partial_outcome() {
        let mut engine = SimulationEngine::new(busy_config(9)).unwrap();
        for _ in 0..20 {
            engine.step();
        }
        let token = CancelToken::new();
        token.cancel();
        let outcome = engine.run_with_cancel(&token);
        assert!(outcome.cancelled);
        assert_eq!(outcome.cycles_completed, 20);
        assert_eq!(outcome.records.last().unwrap().cycle, 20);
    }

    #[test]
    fn test_snapshot_interval_keeps_final_record() {
        let config = EngineConfig {
            cycles: 95,
            snapshot_interval: 10,
            ..busy_config(4)
        };
        let outcome = SimulationEngine::new(config).unwrap().run();
        let cycles: Vec<u32> = outcome.records.iter().map(|r| r.cycle).collect();
        assert_eq!(cycles.len(), 10);
        assert_eq!(cycles[0], 10);
        assert_eq!(*cycles.last().unwrap(), 95);
    }

    #[test]
    fn test_single_population_reference_run_reproducible() {
        let config = EngineConfig {
            seed: 42,
            cycles: 3000,
            f_intra: 0.025,
            f_migrate: 0.0,
            max_population_size: Some(40),
            snapshot_interval: 100,
            ..Default::default()
        };
        let a = SimulationEngine::new(config.clone()).unwrap().run();
        let b = SimulationEngine::new(config).unwrap().run();
        assert_eq!(a.final_mean_population, b.final_mean_population);
        assert_eq!(a.basin, b.basin);
        assert_eq!(a.records, b.records);
        assert_eq!(a.cycles_completed, 3000);
    }

    #[test]
    fn test_capacity_rejections_separate_from_energy_failures() {
        let config = EngineConfig {
            shape: HierarchyShape::single(10),
            max_population_size: Some(10),
            f_intra: 0.5,
            ..quiet_config()
        };
        let mut engine = SimulationEngine::new(config).unwrap();
        for _ in 0..20 {
            let report = engine.step();
            assert_eq!(report.spawned, 0);
            assert_eq!(report.spawn_failures, 0);
            assert_eq!(report.capacity_rejections, report.spawn_attempts);
        }
        let counters = engine.counters();
        assert!(counters.capacity_rejections > 0);
        assert_eq!(counters.spawn_failures, 0);
    }

    #[test]
    fn test_default_run_keeps_resonating() {
        let config = EngineConfig {
            cycles: 1000,
            snapshot_interval: 10,
            ..Default::default()
        };
        let outcome = SimulationEngine::new(config).unwrap().run();
        let late = counter_delta(&outcome.records, 500, 1000, |c| c.compositions).unwrap();
        assert!(late > 0, "no compositions after cycle 500");
        assert_eq!(outcome.counters.capacity_rejections, 0);
    }

    /// Fixed-size population with ample recharge, so only the suppression
    /// window changes the composition rate.
    fn saturated_config(perturbations: Vec<Perturbation>) -> EngineConfig {
        EngineConfig {
            seed: 42,
            cycles: 5000,
            shape: HierarchyShape::single(20),
            max_population_size: Some(20),
            recharge_rate: 3.0,
            snapshot_interval: 10,
            perturbations,
            restoration: Some(RestorationConfig {
                baseline_window: 20,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_suppression_window_lowers_composition_rate() {
        let window = Perturbation::suppression(2000, 2500, 0.5);
        let perturbed = SimulationEngine::new(saturated_config(vec![window]))
            .unwrap()
            .run();
        let reference = SimulationEngine::new(saturated_config(Vec::new()))
            .unwrap()
            .run();

        let compositions = |records: &[CycleMetrics]| {
            counter_delta(records, window.start, window.end, |c| c.compositions).unwrap()
        };
        let suppressed = compositions(&perturbed.records);
        let baseline = compositions(&reference.records);
        assert!(baseline > 0);
        assert!(
            (suppressed as f64) < 0.75 * baseline as f64,
            "window compositions {} vs unperturbed {}",
            suppressed,
            baseline
        );

        let blocked = counter_delta(&perturbed.records, window.start, window.end, |c| {
            c.suppressed_compositions
        })
        .unwrap();
        assert!(blocked > 0);
        assert!(perturbed.counters.suppressed_compositions >= blocked);
        assert_eq!(reference.counters.suppressed_compositions, 0);

        let report = perturbed.restoration.unwrap();
        if report.restored {
            assert!(report.recovery_time.unwrap() <= 2500);
        }
    }

    #[test]
    fn test_restoration_fails_after_extinction() {
        let config = EngineConfig {
            cycles: 200,
            perturbations: vec![Perturbation {
                start: 50,
                end: 60,
                effect: PerturbationEffect::EnergyDrain { amount: 100.0 },
            }],
            restoration: Some(RestorationConfig {
                metric: TrackedMetric::TotalAgents,
                baseline_window: 10,
                tolerance: 0.10,
            }),
            ..Default::default()
        };
        let outcome = SimulationEngine::new(config).unwrap().run();
        assert_eq!(outcome.records.last().unwrap().total_agents, 0);
        assert_eq!(outcome.basin, Basin::B);
        let report = outcome.restoration.unwrap();
        assert!(report.baseline > 0.0);
        assert!(!report.restored);
        assert_eq!(report.recovery_time, None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn proptest_energy_and_conservation_hold(
            seed in any::<u64>(),
            f_intra in 0.0f64..0.2,
            f_migrate in 0.0f64..0.2,
            share in 0.0f64..=1.0,
        ) {
            let config = EngineConfig {
                seed,
                f_intra,
                f_migrate,
                energy_share: share,
                ..busy_config(seed)
            };
            let mut engine = SimulationEngine::new(config).unwrap();
            let cap = engine.config().e_cap;
            for _ in 0..40 {
                let before = engine.hierarchy().total_agents() as i64;
                let report = engine.step();
                let after = engine.hierarchy().total_agents() as i64;
                prop_assert_eq!(after, before + report.spawned as i64 - report.pruned as i64);
                prop_assert!(engine.hierarchy().agents().all(|a| a.energy() >= 0.0 && a.energy() <= cap));
            }
        }
    }
}
