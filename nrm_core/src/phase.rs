//! PhaseMapper - deterministic phase generation and resonance distance.
//!
//! Phases are points on the 3-torus `[0, 2π)^3`, stored as `Vector3<f64>`.
//! The mapper turns a counter, a seeded counter, or an external metric
//! vector into such a point using irrational moduli (π, e, φ), so the same
//! input always yields the same phase and consecutive counters spread
//! evenly over the torus (Weyl sequence).
//!
//! # Formulas
//! ```text
//! counter n:      θ_k = 2π · frac(n · α_k),   α = (π-3, e-2, φ-1)
//! metrics m:      θ_k = (m_k · c_k) mod 2π,  c = (π, e, φ)
//! jitter p, z:    θ_k = (p_k + z_k) mod 2π
//! drift p, n, r:  θ_k = (p_k + r · (map(n)_k / π - 1)) mod 2π
//! ```

use crate::constants::{PHI, SEED_MIX_A, TAU};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::{E, PI};

/// A point in phase space, each component in `[0, 2π)`.
pub type Phase = Vector3<f64>;

/// Irrational moduli for the metric mapping.
const MODULI: [f64; 3] = [PI, E, PHI];

/// Fractional parts of the moduli, used as Weyl increments.
const WEYL: [f64; 3] = [PI - 3.0, E - 2.0, PHI - 1.0];

/// Input signal for the mapper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseInput {
    /// A plain counter (cycle index, event count, ...).
    Counter(u64),
    /// A counter salted with a run seed.
    Seeded { seed: u64, counter: u64 },
    /// An external metric vector; only its values matter, not their source.
    Metrics([f64; 3]),
}

/// How the distance between two phases is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseDistance {
    /// Euclidean norm of the wrapped per-axis differences. Range `[0, √3·π]`.
    #[default]
    Euclidean,
    /// Largest wrapped per-axis difference. Range `[0, π]`.
    MaxAxis,
}

/// Wraps an angle into `[0, 2π)`.
pub fn wrap_angle(theta: f64) -> f64 {
    let wrapped = theta.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Shortest angular separation of two angles, in `[0, π]`.
pub fn circular_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

/// Stateless phase mapper. All methods are pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseMapper {
    pub metric: PhaseDistance,
}

impl PhaseMapper {
    pub fn new(metric: PhaseDistance) -> Self {
        Self { metric }
    }

    /// Maps an input signal to a phase.
    pub fn map(&self, input: PhaseInput) -> Phase {
        match input {
            PhaseInput::Counter(n) => weyl_point(n),
            PhaseInput::Seeded { seed, counter } => {
                weyl_point(seed.wrapping_mul(SEED_MIX_A) ^ counter)
            }
            PhaseInput::Metrics(m) => Vector3::new(
                wrap_angle(m[0] * MODULI[0]),
                wrap_angle(m[1] * MODULI[1]),
                wrap_angle(m[2] * MODULI[2]),
            ),
        }
    }

    /// Scalar projection of `map`, normalized to `[0, 1)`. Used as a
    /// pattern value.
    pub fn scalar(&self, input: PhaseInput) -> f64 {
        self.map(input).x / TAU
    }

    /// Parent phase displaced by `noise` (already sampled), wrapped.
    pub fn jitter(&self, parent: &Phase, noise: [f64; 3]) -> Phase {
        Vector3::new(
            wrap_angle(parent.x + noise[0]),
            wrap_angle(parent.y + noise[1]),
            wrap_angle(parent.z + noise[2]),
        )
    }

    /// Phase moved by `step` radians along every axis (negative = backwards).
    pub fn nudge(&self, phase: &Phase, step: f64) -> Phase {
        self.jitter(phase, [step, step, step])
    }

    /// Advances `phase` by the velocity the mapper assigns to `counter`.
    ///
    /// Each axis moves by at most `rate` radians. Distinct counters get
    /// distinct velocities, so agents keyed by id pass through each other's
    /// resonance band over time instead of freezing in place.
    pub fn drift(&self, phase: &Phase, counter: u64, rate: f64) -> Phase {
        if rate == 0.0 {
            return *phase;
        }
        let v = self.map(PhaseInput::Counter(counter)).map(|c| rate * (c / PI - 1.0));
        self.jitter(phase, [v.x, v.y, v.z])
    }

    /// Resonance distance between two phases.
    pub fn distance(&self, a: &Phase, b: &Phase) -> f64 {
        let delta = Vector3::new(
            circular_difference(a.x, b.x),
            circular_difference(a.y, b.y),
            circular_difference(a.z, b.z),
        );
        match self.metric {
            PhaseDistance::Euclidean => delta.norm(),
            PhaseDistance::MaxAxis => delta.max(),
        }
    }

    /// Largest distance the metric can report.
    pub fn max_distance(&self) -> f64 {
        match self.metric {
            PhaseDistance::Euclidean => 3f64.sqrt() * PI,
            PhaseDistance::MaxAxis => PI,
        }
    }
}

/// Weyl-sequence point for a counter. The counter is folded to 32 bits so
/// `n · α` keeps enough mantissa for a meaningful fractional part.
fn weyl_point(n: u64) -> Phase {
    let folded = ((n >> 32) ^ (n & 0xffff_ffff)) as f64 + 1.0;
    Vector3::new(
        wrap_angle((folded * WEYL[0]).fract() * TAU),
        wrap_angle((folded * WEYL[1]).fract() * TAU),
        wrap_angle((folded * WEYL[2]).fract() * TAU),
    )
}
