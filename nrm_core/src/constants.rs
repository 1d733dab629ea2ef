//! Default parameter values for the engine.
//!
//! These mirror the reference single-population experiment (2.5% spawn
//! frequency, 2.5-agent viability threshold) and are the values
//! `EngineConfig::default()` starts from.

use std::f64::consts::PI;

/// Full turn in radians. Phase components live in `[0, TAU)`.
pub const TAU: f64 = 2.0 * PI;

/// Golden ratio, third irrational modulus of the PhaseMapper.
pub const PHI: f64 = 1.618_033_988_749_895;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CYCLES: u32 = 3000;
pub const DEFAULT_AGENTS_PER_POPULATION: usize = 10;

pub const DEFAULT_F_INTRA: f64 = 0.025;
pub const DEFAULT_F_MIGRATE: f64 = 0.0;

pub const DEFAULT_E_INITIAL: f64 = 10.0;
pub const DEFAULT_E_CAP: f64 = 50.0;
pub const DEFAULT_E_SPAWN_THRESHOLD: f64 = 10.0;
pub const DEFAULT_E_SPAWN_COST: f64 = 3.0;
pub const DEFAULT_E_MIGRATE_THRESHOLD: f64 = 0.0;
pub const DEFAULT_RECHARGE_RATE: f64 = 0.5;
pub const DEFAULT_VIABILITY_FLOOR: f64 = 1.0;

pub const DEFAULT_THETA_COMP: f64 = 1.0;
pub const DEFAULT_THETA_DECOMP: f64 = 5.0;
pub const DEFAULT_COMPOSITION_ENERGY_DELTA: f64 = -1.0;
pub const DEFAULT_DECOMPOSITION_ENERGY_GAIN: f64 = 0.5;
pub const DEFAULT_COMPOSITION_PHASE_STEP: f64 = 0.1;
pub const DEFAULT_PHASE_NOISE_STD: f64 = 0.2;
/// Largest per-axis phase advance per cycle (radians).
pub const DEFAULT_PHASE_DRIFT_RATE: f64 = 0.1;

pub const DEFAULT_PATTERN_CAPACITY: usize = 10;
pub const DEFAULT_TARGET_WEIGHT_SUM: f64 = 10.0;
pub const DEFAULT_SCALING_INTERVAL: u32 = 100;
pub const DEFAULT_POTENTIATION_RATE: f64 = 0.05;

/// Ceiling for a single pattern weight; keeps unregulated runs finite.
pub const MAX_PATTERN_WEIGHT: f64 = 1.0e6;

pub const DEFAULT_VIABILITY_THRESHOLD: f64 = 2.5;

pub const DEFAULT_RESTORATION_TOLERANCE: f64 = 0.10;
pub const DEFAULT_BASELINE_WINDOW: u32 = 100;

/// Seed-derivation multipliers (golden-ratio and splitmix primes).
pub const SEED_MIX_A: u64 = 0x9e37_79b9_7f4a_7c15;
pub const SEED_MIX_B: u64 = 0x517c_c1b7_2722_0a95;
