//! Deterministic RNG construction.
//!
//! Every run owns exactly one `ChaCha8Rng`, created here from the run seed
//! and threaded through the engine by `&mut`. Nothing in the crate touches
//! a thread-local or global generator.

use crate::constants::{SEED_MIX_A, SEED_MIX_B};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Creates the run generator for a seed.
pub fn create_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Derives an independent seed for the `index`-th run of a batch.
///
/// `derive_seed(base, 0) == base` so a single-seed batch reproduces the
/// plain run.
pub fn derive_seed(base_seed: u64, index: u64) -> u64 {
    if index == 0 {
        return base_seed;
    }
    base_seed
        .wrapping_mul(SEED_MIX_A)
        .wrapping_add(index.wrapping_mul(SEED_MIX_B))
}
