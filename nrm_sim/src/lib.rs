//! NRM Simulation Harness
//!
//! Runs the Nested Resonance Memory engine through named experiment
//! scenarios and judges the outcome of each run.
//!
//! # Core Principle: One Seed, One Trajectory
//!
//! Every run is `(EngineConfig, seed)`. The engine owns its only RNG, so:
//! - **Reproducibility**: rerunning a seed reproduces every metrics record
//! - **Parallelism**: seeds of a batch run on independent blocking tasks
//! - **Cancellation**: a shared flag stops runs between cycles
//!
//! # Usage
//!
//! ```ignore
//! use nrm_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_cycles(3000)
//!     .run(ScenarioId::SinglePopulation)?;
//! println!("basin={} passed={}", result.basin(), result.passed);
//! ```

mod batch;
mod error;
mod exporter;
mod runner;
pub mod scenarios;

pub use batch::{batch_seeds, run_batch};
pub use error::SimError;
pub use exporter::{run_id, write_to_file, ComparisonSummary, RunExport};
pub use runner::{topology_pair, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
