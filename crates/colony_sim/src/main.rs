//! Headless colony runner.
//!
//! Drives the autopilot against the simulated grid world without any real
//! game attached.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in scenario for 3000 ticks and write metrics
//! cargo run -p colony_sim -- run --scenario starter --ticks 3000 --output run.json
//!
//! # Check that repeated runs end in the same state
//! cargo run -p colony_sim -- verify --ticks 500 --runs 3
//!
//! # Parse and validate an autopilot config
//! cargo run -p colony_sim -- check-config colony.ron
//! ```
//!
//! Logs go to stderr; metrics JSON goes to stdout unless `--output` is given.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use colony_core::config::ColonyConfig;
use colony_sim::error::Result;
use colony_sim::runner::{verify_determinism, HeadlessRunner, RunnerConfig};
use colony_sim::scenario::{Scenario, STARTER};

#[derive(Parser)]
#[command(name = "colony_sim")]
#[command(about = "Headless grid world for the colony autopilot")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scenario and report metrics
    Run {
        /// Scenario file, or "starter" for the built-in one
        #[arg(short, long, default_value = STARTER)]
        scenario: String,

        /// Ticks to run
        #[arg(short, long, default_value = "1000")]
        ticks: u64,

        /// Agents processed per tick at most
        #[arg(long)]
        agent_quota: Option<usize>,

        /// Write metrics JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a scenario several times and compare final state hashes
    Verify {
        /// Scenario file, or "starter" for the built-in one
        #[arg(short, long, default_value = STARTER)]
        scenario: String,

        /// Ticks per run
        #[arg(short, long, default_value = "500")]
        ticks: u64,

        /// Number of runs
        #[arg(short, long, default_value = "3")]
        runs: usize,
    },

    /// Parse and validate an autopilot config file
    CheckConfig {
        /// RON config file
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            ticks,
            agent_quota,
            output,
        } => cmd_run(&scenario, RunnerConfig { ticks, agent_quota }, output),
        Commands::Verify {
            scenario,
            ticks,
            runs,
        } => cmd_verify(&scenario, ticks, runs),
        Commands::CheckConfig { path } => cmd_check_config(path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(scenario: &str, config: RunnerConfig, output: Option<PathBuf>) -> Result<()> {
    let scenario = Scenario::resolve(scenario)?;
    let metrics = HeadlessRunner::new(&scenario, config)?.run()?;

    match output {
        Some(path) => {
            metrics.write_json(&path)?;
            info!(path = %path.display(), "Metrics written");
        }
        None => println!("{}", metrics.to_json()?),
    }
    Ok(())
}

fn cmd_verify(scenario: &str, ticks: u64, runs: usize) -> Result<()> {
    let scenario = Scenario::resolve(scenario)?;
    let config = RunnerConfig {
        ticks,
        agent_quota: None,
    };
    let hash = verify_determinism(&scenario, config, runs)?;
    info!(runs, ticks, hash = format_args!("{hash:016x}"), "Deterministic");
    println!("{hash:016x}");
    Ok(())
}

fn cmd_check_config(path: PathBuf) -> Result<()> {
    let config = ColonyConfig::load(&path)?;
    info!(
        path = %path.display(),
        planning_interval = config.planner.planning_interval,
        spine = config.planner.spine_enabled,
        baseline = config.autoscaler.baseline_population,
        "Config is valid"
    );
    Ok(())
}
