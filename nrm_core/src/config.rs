//! Engine configuration.
//!
//! One `EngineConfig` describes every experiment variant: hierarchy depth,
//! energy-sharing topology, homeostasis on/off and perturbation windows are
//! all data. `validate()` runs once at construction; a config that passes it
//! cannot fail mid-run.

use crate::constants::*;
use crate::error::ConfigError;
use crate::phase::PhaseDistance;
use serde::{Deserialize, Serialize};

/// Shape of the population tree.
///
/// `branching[0]` is the fan-out of the root, each further entry the fan-out
/// of the level below; the last level's children are populations. `[10]` is
/// ten flat populations, `[3, 4]` three MetaPopulations of four.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyShape {
    pub branching: Vec<usize>,
    /// Agents created in each population at initialization (`N_initial`).
    pub agents_per_population: usize,
}

impl HierarchyShape {
    /// A single population.
    pub fn single(agents: usize) -> Self {
        Self::flat(1, agents)
    }

    /// `populations` siblings directly under the root.
    pub fn flat(populations: usize, agents: usize) -> Self {
        Self {
            branching: vec![populations],
            agents_per_population: agents,
        }
    }

    /// `groups` MetaPopulations, each holding `populations` populations.
    pub fn nested(groups: usize, populations: usize, agents: usize) -> Self {
        Self {
            branching: vec![groups, populations],
            agents_per_population: agents,
        }
    }

    /// Total number of leaf populations.
    pub fn population_count(&self) -> usize {
        self.branching.iter().product()
    }

    /// Number of levels including the population level.
    pub fn depth(&self) -> usize {
        self.branching.len() + 1
    }
}

impl Default for HierarchyShape {
    fn default() -> Self {
        Self::single(DEFAULT_AGENTS_PER_POPULATION)
    }
}

/// Partition of populations into energy-sharing clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    /// Every population is its own cluster.
    #[default]
    Isolated,
    /// Consecutive pairs; an odd trailing population stays alone.
    Paired,
    /// Consecutive blocks of `size`.
    Grouped { size: usize },
    /// One cluster per lowest-level MetaPopulation.
    PerMetaPopulation,
    /// All populations share one pool.
    Global,
    /// Explicit partition by population index.
    Custom { clusters: Vec<Vec<usize>> },
}

/// Which populations may exchange migrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MigrationScope {
    /// Any population to any other.
    #[default]
    Global,
    /// Only between populations sharing a parent MetaPopulation.
    SiblingGroup,
    /// Only between populations of the same energy cluster.
    Cluster,
}

/// Whose total energy must reach `e_migrate_threshold` for a source to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MigrationGate {
    #[default]
    Population,
    Cluster,
}

/// Effect applied while a perturbation window is open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerturbationEffect {
    /// Each qualifying composition is blocked with probability `fraction`.
    CompositionSuppression { fraction: f64 },
    /// Multiplies the recharge budget.
    RechargeScale { factor: f64 },
    /// Extra per-agent energy cost charged before pruning.
    EnergyDrain { amount: f64 },
}

/// A perturbation active for cycles in `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Perturbation {
    pub start: u32,
    pub end: u32,
    pub effect: PerturbationEffect,
}

impl Perturbation {
    pub fn suppression(start: u32, end: u32, fraction: f64) -> Self {
        Self {
            start,
            end,
            effect: PerturbationEffect::CompositionSuppression { fraction },
        }
    }

    pub fn is_active(&self, cycle: u32) -> bool {
        cycle >= self.start && cycle < self.end
    }

    /// Number of cycles the window stays open.
    pub fn duration(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// Quantity compared against its pre-perturbation baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackedMetric {
    #[default]
    MeanPatternWeight,
    TotalAgents,
    MeanPopulationSize,
}

/// Restoration check run after the first perturbation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorationConfig {
    pub metric: TrackedMetric,
    /// Snapshots averaged for the baseline and for the final value.
    pub baseline_window: u32,
    /// Relative band around the baseline, e.g. 0.10 for ±10%.
    pub tolerance: f64,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        Self {
            metric: TrackedMetric::MeanPatternWeight,
            baseline_window: DEFAULT_BASELINE_WINDOW,
            tolerance: DEFAULT_RESTORATION_TOLERANCE,
        }
    }
}

/// Complete parameter set for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed of the run's only RNG.
    pub seed: u64,
    /// Cycles executed by `run()`.
    pub cycles: u32,

    // --- Structure ---
    pub shape: HierarchyShape,
    pub topology: Topology,
    pub migration_scope: MigrationScope,
    pub migration_gate: MigrationGate,
    /// Optional carrying capacity. Spawn attempts into a full population
    /// are counted as capacity rejections, not energy failures.
    pub max_population_size: Option<usize>,

    // --- Rates ---
    pub f_intra: f64,
    pub f_migrate: f64,

    // --- Energy ---
    pub e_initial: f64,
    pub e_cap: f64,
    pub e_spawn_threshold: f64,
    pub e_spawn_cost: f64,
    pub e_migrate_threshold: f64,
    pub recharge_rate: f64,
    /// Fraction of each agent's energy pooled across its cluster per cycle.
    pub energy_share: f64,
    /// Per-cycle cost charged before pruning.
    pub living_cost: f64,
    /// Agents below this energy are pruned.
    pub viability_floor: f64,

    // --- Resonance ---
    pub theta_comp: f64,
    pub theta_decomp: f64,
    pub phase_distance: PhaseDistance,
    /// Applied to both partners of a composition (negative = cost).
    pub composition_energy_delta: f64,
    pub decomposition_energy_gain: f64,
    pub composition_phase_step: f64,
    /// Standard deviation of the Gaussian jitter on spawned phases.
    pub phase_noise_std: f64,
    /// Per-cycle phase advance bound; each agent drifts at its own
    /// velocity so pairs keep entering and leaving resonance.
    pub phase_drift_rate: f64,

    // --- Pattern memory / homeostasis ---
    pub pattern_capacity: usize,
    pub target_weight_sum: f64,
    pub scaling_interval: u32,
    pub homeostasis: bool,
    pub potentiation_rate: f64,

    // --- Classification / output ---
    pub viability_threshold: f64,
    pub snapshot_interval: u32,
    pub perturbations: Vec<Perturbation>,
    pub restoration: Option<RestorationConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            cycles: DEFAULT_CYCLES,
            shape: HierarchyShape::default(),
            topology: Topology::Isolated,
            migration_scope: MigrationScope::Global,
            migration_gate: MigrationGate::Population,
            max_population_size: None,
            f_intra: DEFAULT_F_INTRA,
            f_migrate: DEFAULT_F_MIGRATE,
            e_initial: DEFAULT_E_INITIAL,
            e_cap: DEFAULT_E_CAP,
            e_spawn_threshold: DEFAULT_E_SPAWN_THRESHOLD,
            e_spawn_cost: DEFAULT_E_SPAWN_COST,
            e_migrate_threshold: DEFAULT_E_MIGRATE_THRESHOLD,
            recharge_rate: DEFAULT_RECHARGE_RATE,
            energy_share: 0.0,
            living_cost: 0.0,
            viability_floor: DEFAULT_VIABILITY_FLOOR,
            theta_comp: DEFAULT_THETA_COMP,
            theta_decomp: DEFAULT_THETA_DECOMP,
            phase_distance: PhaseDistance::Euclidean,
            composition_energy_delta: DEFAULT_COMPOSITION_ENERGY_DELTA,
            decomposition_energy_gain: DEFAULT_DECOMPOSITION_ENERGY_GAIN,
            composition_phase_step: DEFAULT_COMPOSITION_PHASE_STEP,
            phase_noise_std: DEFAULT_PHASE_NOISE_STD,
            phase_drift_rate: DEFAULT_PHASE_DRIFT_RATE,
            pattern_capacity: DEFAULT_PATTERN_CAPACITY,
            target_weight_sum: DEFAULT_TARGET_WEIGHT_SUM,
            scaling_interval: DEFAULT_SCALING_INTERVAL,
            homeostasis: true,
            potentiation_rate: DEFAULT_POTENTIATION_RATE,
            viability_threshold: DEFAULT_VIABILITY_THRESHOLD,
            snapshot_interval: 1,
            perturbations: Vec::new(),
            restoration: None,
        }
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeParameter { name, value })
    }
}

fn unit_range(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}

fn phase_band(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..TAU).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::PhaseThresholdOutOfRange { name, value })
    }
}

impl EngineConfig {
    /// Parses a (possibly partial) JSON document over the defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    /// True when homeostatic scaling runs at the end of `cycle`.
    pub fn scaling_due(&self, cycle: u32) -> bool {
        self.homeostasis && self.scaling_interval > 0 && cycle % self.scaling_interval == 0
    }

    /// Validates every parameter. Called by `SimulationEngine::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape.branching.is_empty() {
            return Err(ConfigError::shape("branching must have at least one level"));
        }
        if let Some(level) = self.shape.branching.iter().position(|&b| b == 0) {
            return Err(ConfigError::shape(format!("level {} has zero children", level)));
        }
        if let Some(0) = self.max_population_size {
            return Err(ConfigError::shape("max_population_size must be at least 1"));
        }

        non_negative("f_intra", self.f_intra)?;
        non_negative("f_migrate", self.f_migrate)?;
        non_negative("e_initial", self.e_initial)?;
        non_negative("e_cap", self.e_cap)?;
        non_negative("e_spawn_threshold", self.e_spawn_threshold)?;
        non_negative("e_spawn_cost", self.e_spawn_cost)?;
        non_negative("e_migrate_threshold", self.e_migrate_threshold)?;
        non_negative("recharge_rate", self.recharge_rate)?;
        non_negative("living_cost", self.living_cost)?;
        non_negative("viability_floor", self.viability_floor)?;
        non_negative("decomposition_energy_gain", self.decomposition_energy_gain)?;
        non_negative("composition_phase_step", self.composition_phase_step)?;
        non_negative("phase_noise_std", self.phase_noise_std)?;
        non_negative("phase_drift_rate", self.phase_drift_rate)?;
        non_negative("target_weight_sum", self.target_weight_sum)?;
        non_negative("potentiation_rate", self.potentiation_rate)?;
        non_negative("viability_threshold", self.viability_threshold)?;
        unit_range("energy_share", self.energy_share)?;
        if !self.composition_energy_delta.is_finite() {
            return Err(ConfigError::NegativeParameter {
                name: "composition_energy_delta",
                value: self.composition_energy_delta,
            });
        }

        if self.e_initial > self.e_cap {
            return Err(ConfigError::EnergyBounds(format!(
                "e_initial {} exceeds e_cap {}",
                self.e_initial, self.e_cap
            )));
        }
        if self.viability_floor > self.e_cap {
            return Err(ConfigError::EnergyBounds(format!(
                "viability_floor {} exceeds e_cap {}",
                self.viability_floor, self.e_cap
            )));
        }

        phase_band("theta_comp", self.theta_comp)?;
        phase_band("theta_decomp", self.theta_decomp)?;
        if self.theta_comp >= self.theta_decomp {
            return Err(ConfigError::OverlappingBands {
                comp: self.theta_comp,
                decomp: self.theta_decomp,
            });
        }

        if self.homeostasis && (self.pattern_capacity == 0 || self.scaling_interval == 0) {
            return Err(ConfigError::HomeostasisWithoutPatterns);
        }
        if self.snapshot_interval == 0 {
            return Err(ConfigError::ZeroSnapshotInterval);
        }

        for p in &self.perturbations {
            if p.start >= p.end {
                return Err(ConfigError::InvalidPerturbation(format!(
                    "window [{}, {}) is empty",
                    p.start, p.end
                )));
            }
            match p.effect {
                PerturbationEffect::CompositionSuppression { fraction } => {
                    unit_range("suppression fraction", fraction)?
                }
                PerturbationEffect::RechargeScale { factor } => {
                    non_negative("recharge scale factor", factor)?
                }
                PerturbationEffect::EnergyDrain { amount } => {
                    non_negative("energy drain amount", amount)?
                }
            }
        }
        if let Some(r) = &self.restoration {
            if r.baseline_window == 0 {
                return Err(ConfigError::InvalidPerturbation(
                    "restoration baseline window must be at least 1".to_string(),
                ));
            }
            non_negative("restoration tolerance", r.tolerance)?;
        }

        if let Topology::Grouped { size: 0 } = self.topology {
            return Err(ConfigError::partition("group size must be at least 1"));
        }
        if let Topology::Custom { clusters } = &self.topology {
            let n = self.shape.population_count();
            let mut seen = vec![false; n];
            for cluster in clusters {
                if cluster.is_empty() {
                    return Err(ConfigError::partition("empty cluster"));
                }
                for &idx in cluster {
                    if idx >= n {
                        return Err(ConfigError::partition(format!(
                            "population {} out of range (have {})",
                            idx, n
                        )));
                    }
                    if seen[idx] {
                        return Err(ConfigError::partition(format!(
                            "population {} assigned twice",
                            idx
                        )));
                    }
                    seen[idx] = true;
                }
            }
            if let Some(missing) = seen.iter().position(|s| !s) {
                return Err(ConfigError::partition(format!(
                    "population {} not assigned to any cluster",
                    missing
                )));
            }
        }

        Ok(())
    }
}
