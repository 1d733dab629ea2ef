//! NRM Simulator CLI
//!
//! Run Nested Resonance Memory experiment scenarios over one or more seeds.

use clap::Parser;
use nrm_core::{CancelToken, EngineConfig};
use nrm_sim::{
    batch_seeds, run_batch, write_to_file, RunExport, ScenarioId, ScenarioResult,
    ScenarioRunner, SimError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Nested Resonance Memory experiment CLI
#[derive(Parser, Debug)]
#[command(name = "nrm-sim")]
#[command(about = "Run Nested Resonance Memory experiment scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of seeds to run per scenario
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Scenario to run (single_population, topology_comparison, metapopulation,
    /// suppression, no_homeostasis, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Override every scenario's cycle count
    #[arg(short, long)]
    cycles: Option<u32>,

    /// JSON file with base engine parameters (partial documents allowed)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Export run records to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so --json keeps stdout clean
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.json { Level::WARN } else { level })
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

/// Runs every requested scenario; `Ok(true)` when all runs passed.
async fn run(args: Args) -> Result<bool, SimError> {
    if !args.json {
        info!("NRM Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(SimError::UnknownScenario)?]
    };

    let base_seed = if args.seed == 0 { rand::random() } else { args.seed };

    let mut runner = ScenarioRunner::new(base_seed);
    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)?;
        let base = EngineConfig::from_json_str(&text)?;
        base.validate()?;
        runner = runner.with_base_config(base);
    }
    if let Some(cycles) = args.cycles {
        runner = runner.with_cycles(cycles);
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current cycle");
                cancel.cancel();
            }
        });
    }

    let seeds = batch_seeds(base_seed, args.seeds.max(1));
    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for scenario in &scenarios {
        if !args.json {
            info!("▶ {}: {}", scenario.name(), scenario.description());
        }
        let results = run_batch(&runner, *scenario, &seeds, &cancel).await?;

        if !args.json {
            for result in &results {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED basin={} mean_population={:.2}",
                        scenario.name(),
                        result.seed,
                        result.basin(),
                        result.outcome.final_mean_population
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
        all_results.extend(results);

        if cancel.is_cancelled() {
            break;
        }
    }

    if let Some(path) = &args.export {
        let exports: Vec<RunExport> = all_results.iter().map(RunExport::from_result).collect();
        write_to_file(&exports, path)?;
        if !args.json {
            info!("Exported {} runs to {}", exports.len(), path.display());
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "cancelled": cancel.is_cancelled(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "basin": r.basin(),
                    "cycles": r.outcome.cycles_completed,
                    "final_mean_population": r.outcome.final_mean_population,
                    "viable_fraction": r.outcome.viable_fraction,
                    "restoration": r.outcome.restoration,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed_count == 0)
}
