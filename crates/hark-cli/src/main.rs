use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hark::config::Config;
use hark_cli::commands::{ConfigCommand, NearbyCommand, SimulateCommand};
use hark_cli::error::CliResult;
use hark_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Parser)]
#[command(name = "hark")]
#[command(about = "Hark CLI - Query nearby memories and replay location traces")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "List memories audible at a point, best first")]
    Nearby(NearbyCommand),

    #[clap(about = "Replay a location trace and show what would play")]
    Simulate(SimulateCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,hark=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    match &cli.command {
        Command::Config(cmd) => cmd.execute(cli.config.as_deref(), format).await,
        Command::Nearby(cmd) => {
            let config = Config::load(cli.config.as_deref())?;
            cmd.execute(&config, format).await
        }
        Command::Simulate(cmd) => {
            let config = Config::load(cli.config.as_deref())?;
            cmd.execute(&config, format).await
        }
    }
}
