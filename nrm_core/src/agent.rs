//! Agent - the atomic simulated entity.

use crate::constants::MAX_PATTERN_WEIGHT;
use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Run-unique agent handle. Ids are issued from a counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// One entry of an agent's pattern memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// PhaseMapper output in `[0, 1)`.
    pub value: f64,
    pub weight: f64,
}

impl Pattern {
    pub fn new(value: f64) -> Self {
        Self { value, weight: 1.0 }
    }
}

/// A simulated agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    energy: f64,
    pub phase: Phase,
    /// Lineage depth; founders are 0.
    pub depth: u32,
    pub composition_count: u32,
    patterns: VecDeque<Pattern>,
}

impl Agent {
    /// Creates a founder agent.
    pub fn new(id: AgentId, energy: f64, phase: Phase) -> Self {
        Self {
            id,
            energy,
            phase,
            depth: 0,
            composition_count: 0,
            patterns: VecDeque::new(),
        }
    }

    /// Creates a child one generation below `parent`.
    pub fn spawn_child(parent: &Agent, id: AgentId, energy: f64, phase: Phase) -> Self {
        Self {
            depth: parent.depth + 1,
            ..Self::new(id, energy, phase)
        }
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Adds `delta` to the energy, clamped to `[0, cap]`.
    pub fn adjust_energy(&mut self, delta: f64, cap: f64) {
        self.set_energy(self.energy + delta, cap);
    }

    /// Sets the energy, clamped to `[0, cap]`.
    ///
    /// A non-finite value is a defect upstream; debug builds panic, release
    /// builds clamp to zero.
    pub fn set_energy(&mut self, value: f64, cap: f64) {
        debug_assert!(value.is_finite(), "{} energy became {}", self.id, value);
        self.energy = if value.is_finite() { value.clamp(0.0, cap) } else { 0.0 };
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Appends a pattern, evicting the oldest once `capacity` is reached.
    /// A capacity of zero records nothing.
    pub fn record_pattern(&mut self, pattern: Pattern, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.patterns.len() >= capacity {
            self.patterns.pop_front();
        }
        self.patterns.push_back(pattern);
    }

    /// Multiplies every existing weight by `1 + rate`.
    pub fn potentiate(&mut self, rate: f64) {
        if rate == 0.0 {
            return;
        }
        for p in self.patterns.iter_mut() {
            p.weight = (p.weight * (1.0 + rate)).min(MAX_PATTERN_WEIGHT);
        }
    }

    pub fn weight_sum(&self) -> f64 {
        self.patterns.iter().map(|p| p.weight).sum()
    }

    /// Homeostatic scaling: rescales weights so they sum to `target`.
    ///
    /// A zero sum is replaced by an even split of the target.
    pub fn scale_weights(&mut self, target: f64) {
        if self.patterns.is_empty() {
            return;
        }
        let sum = self.weight_sum();
        if sum <= 0.0 {
            let even = target / self.patterns.len() as f64;
            for p in self.patterns.iter_mut() {
                p.weight = even;
            }
        } else {
            let factor = target / sum;
            for p in self.patterns.iter_mut() {
                p.weight *= factor;
            }
        }
    }
}
