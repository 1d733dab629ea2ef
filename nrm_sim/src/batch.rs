//! Parallel seed batches.
//!
//! Each `(scenario, seed)` run is an independent engine with its own RNG, so
//! a batch is embarrassingly parallel: one blocking-pool task per seed, no
//! shared mutable state beyond the cancel flag.

use crate::error::SimError;
use crate::runner::{ScenarioResult, ScenarioRunner};
use crate::scenarios::ScenarioId;

use nrm_core::{derive_seed, CancelToken};
use tokio::task::JoinSet;
use tracing::debug;

/// Seeds for a batch of `count` runs starting at `base_seed`.
pub fn batch_seeds(base_seed: u64, count: usize) -> Vec<u64> {
    (0..count as u64).map(|i| derive_seed(base_seed, i)).collect()
}

/// Runs `scenario` once per seed on tokio's blocking pool.
///
/// Results come back sorted by seed regardless of completion order. The
/// first failing run aborts the batch.
pub async fn run_batch(
    runner: &ScenarioRunner,
    scenario: ScenarioId,
    seeds: &[u64],
    cancel: &CancelToken,
) -> Result<Vec<ScenarioResult>, SimError> {
    let mut set = JoinSet::new();
    for &seed in seeds {
        let runner = runner.clone().with_seed(seed);
        let cancel = cancel.clone();
        set.spawn_blocking(move || runner.run_with_cancel(scenario, &cancel));
    }
    debug!("Batch: {} x {} seeds", scenario.name(), seeds.len());

    let mut results = Vec::with_capacity(seeds.len());
    while let Some(joined) = set.join_next().await {
        results.push(joined??);
    }
    results.sort_by_key(|r| r.seed);
    Ok(results)
}
