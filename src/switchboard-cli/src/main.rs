//! Switchboard - inspect and change feature switches.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use switchboard_core::SwitchboardConfig;

mod commands;
mod restart;

use commands::{Command, Session};

/// Feature switch registry
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Inspect and change feature switches")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(explicit: Option<PathBuf>) -> Result<SwitchboardConfig> {
    match SwitchboardConfig::resolve_path(explicit) {
        Some(path) => {
            debug!("Using config {}", path.display());
            SwitchboardConfig::load_or_default(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Ok(SwitchboardConfig::default()),
    }
}

fn run(args: Args) -> Result<()> {
    let config = load_config(args.config)?;
    let session = Session::open(config)?;
    session.run(args.command)
}

fn main() -> ExitCode {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_logs);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
