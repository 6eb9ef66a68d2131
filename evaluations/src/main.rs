//! CLI entry point for the golden-scenario replay.

use clap::Parser;
use evaluations::{run_all_invariants, run_all_scenarios, Harness, ScenarioOutcome};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(about = "Replays the query orchestration core's golden scenarios and invariants")]
struct Args {
    /// Only run the quantified invariants, skipping the end-to-end scenarios.
    #[arg(long)]
    invariants_only: bool,

    /// Only run the end-to-end scenarios, skipping the invariants.
    #[arg(long)]
    scenarios_only: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let harness = Harness::new().await;

    let mut outcomes: Vec<ScenarioOutcome> = Vec::new();
    if !args.invariants_only {
        outcomes.extend(run_all_scenarios(&harness).await);
    }
    if !args.scenarios_only {
        outcomes.extend(run_all_invariants(&harness).await);
    }

    let mut any_failed = false;
    for outcome in &outcomes {
        let marker = if outcome.passed { "PASS" } else { "FAIL" };
        if !outcome.passed {
            any_failed = true;
        }
        println!("[{marker}] {}: {}", outcome.name, outcome.detail);
    }

    let passed = outcomes.iter().filter(|o| o.passed).count();
    println!("\n{passed}/{} checks passed", outcomes.len());

    if any_failed {
        std::process::ExitCode::FAILURE
    } else {
        std::process::ExitCode::SUCCESS
    }
}
