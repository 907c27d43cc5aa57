//! record-control - remote recording control client
//!
//! Drives start/stop recording sequences on a remote controller over a
//! request-reply connection, one acknowledged command at a time.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use config::{ControlConfig, Overrides};

/// record-control - remote recording control client
#[derive(Parser, Debug)]
#[command(name = "record-control")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "RECORD_CONTROL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full start/stop sequence and print each reply
    Run(commands::run::RunArgs),

    /// Send a single command and print its reply
    Send(commands::send::SendArgs),

    /// Run a stand-in controller that answers every request
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries replies only.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => ControlConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ControlConfig::default(),
    };
    config.apply(&cli.overrides);
    config.validate()?;

    match cli.command {
        Commands::Run(args) => commands::run::run(config, args).await,
        Commands::Send(args) => commands::send::run(&config, args).await,
        Commands::Serve(args) => commands::serve::run(&config, args).await,
    }
}
