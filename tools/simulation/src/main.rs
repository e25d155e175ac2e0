use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sequencer::timing::SystemClock;
use simulation::backends::SteppingClock;
use simulation::{ScenarioReport, SimConfig, Simulation};

#[derive(Parser, Debug)]
#[command(name = "kt-sim", version, about = "Run the key transparency sequencer and monitor against in-memory backends")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scripted rounds on a deterministic clock
    Run {
        /// Override the number of rounds
        #[arg(long)]
        rounds: Option<u32>,
    },
    /// The sequencer's own timing loop on the system clock
    Live {
        /// Override the run duration in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },
}

fn emit(report: &ScenarioReport, config: &SimConfig) -> anyhow::Result<()> {
    let json = report.to_json();
    match &config.scenario.report_path {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("writing report {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = SimConfig::load(cli.config.as_deref())?;
    sequencer::telemetry::init(&config.log.level);

    if let Some(seed) = cli.seed {
        config.scenario.seed = seed;
    }

    tracing::info!(version = simulation::VERSION, seed = config.scenario.seed, "Starting kt-sim");

    let report = match cli.command {
        Command::Run { rounds } => {
            if let Some(rounds) = rounds {
                config.scenario.rounds = rounds;
            }
            let mut sim = Simulation::build(config.clone(), SteppingClock::fixed())?;
            sim.run().await?
        }
        Command::Live { duration_ms } => {
            if let Some(duration_ms) = duration_ms {
                config.live.duration_ms = duration_ms;
            }
            let clock = Arc::new(SystemClock);
            let sim = Simulation::build(config.clone(), clock.clone())?;
            sim.run_live(clock).await?
        }
    };

    emit(&report, &config)?;
    anyhow::ensure!(
        report.all_verified(),
        "{} of {} epochs failed verification",
        report.epochs_failed,
        report.epochs.len()
    );
    Ok(())
}
