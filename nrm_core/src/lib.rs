//! NRM Core - Nested Resonance Memory population engine
//!
//! A deterministic, discrete-time simulator of energy-bearing agents that
//! compose and decompose by phase resonance inside a recursive hierarchy of
//! populations:
//! 1. **Phase space**: agents live on the 3-torus; PhaseMapper derives
//!    phases from counters, seeds or metric vectors
//! 2. **Energy economy**: spawning costs energy, clusters of populations
//!    pool their recharge, agents below the viability floor are pruned
//! 3. **Memory homeostasis**: compositions potentiate pattern weights;
//!    periodic scaling pulls each agent's weight sum back to target
//!
//! A run is `(EngineConfig, seed) -> Vec<CycleMetrics> + Basin`.

pub mod agent;
pub mod basin;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod metrics;
pub mod phase;
pub mod population;
pub mod rng;

// Re-export key types for convenience
pub use agent::{Agent, AgentId, Pattern};
pub use basin::{assess_restoration, Basin, BasinClassifier, RestorationReport};
pub use cluster::{Cluster, ClusterId};
pub use config::{
    EngineConfig, HierarchyShape, MigrationGate, MigrationScope, Perturbation,
    PerturbationEffect, RestorationConfig, Topology, TrackedMetric,
};
pub use engine::{CancelToken, RunOutcome, SimulationEngine};
pub use error::ConfigError;
pub use hierarchy::{Hierarchy, HierarchyNode, MetaId, MetaSummary};
pub use metrics::{counter_delta, CycleMetrics, PatternStats, RunCounters, StepReport};
pub use phase::{Phase, PhaseDistance, PhaseInput, PhaseMapper};
pub use population::{Population, PopulationId};
pub use rng::{create_rng, derive_seed};
