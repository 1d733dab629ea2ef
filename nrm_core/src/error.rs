//! Error types for engine construction.
//!
//! Only configuration problems are errors. Transient conditions inside a
//! cycle (too little energy to spawn, an empty migration source) are
//! counted in the metrics instead.

use thiserror::Error;

/// Configuration rejected at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The hierarchy shape has no levels or a level with zero children.
    #[error("Invalid hierarchy shape: {0}")]
    InvalidShape(String),

    /// A rate, energy, or cost parameter is negative or not finite.
    #[error("Parameter `{name}` must be finite and non-negative, got {value}")]
    NegativeParameter { name: &'static str, value: f64 },

    /// A probability-like parameter lies outside `[0, 1]`.
    #[error("Parameter `{name}` must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    /// A phase threshold lies outside `[0, 2π)`.
    #[error("Phase threshold `{name}` must lie in [0, 2π), got {value}")]
    PhaseThresholdOutOfRange { name: &'static str, value: f64 },

    /// Composition and decomposition bands overlap.
    #[error("Composition threshold {comp} must be below decomposition threshold {decomp}")]
    OverlappingBands { comp: f64, decomp: f64 },

    /// Energy bounds are inconsistent (e.g. `E_initial > E_cap`).
    #[error("Inconsistent energy bounds: {0}")]
    EnergyBounds(String),

    /// Homeostasis is enabled but agents cannot hold patterns.
    #[error("Homeostasis requires pattern capacity > 0 and scaling interval > 0")]
    HomeostasisWithoutPatterns,

    /// The cluster partition does not cover every population exactly once.
    #[error("Invalid cluster partition: {0}")]
    InvalidPartition(String),

    /// A perturbation window is empty or otherwise malformed.
    #[error("Invalid perturbation: {0}")]
    InvalidPerturbation(String),

    /// Snapshot interval of zero.
    #[error("Snapshot interval must be at least 1")]
    ZeroSnapshotInterval,
}

impl ConfigError {
    /// Creates a shape error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }

    /// Creates a partition error.
    pub fn partition(msg: impl Into<String>) -> Self {
        Self::InvalidPartition(msg.into())
    }
}
