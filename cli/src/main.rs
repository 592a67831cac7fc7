//! CLI for tracemux
//!
//! Commands:
//! - simulate: run a session scenario through the enable-state engine
//! - tokenize: show how filter data is split for provider callbacks

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod manager;
mod output;
mod scenario;

#[derive(Parser)]
#[command(name = "tracemux")]
#[command(about = "tracemux - session enable-state engine for in-process tracing", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario of sessions, providers and events
    Simulate(commands::simulate::SimulateArgs),

    /// Tokenize provider filter data
    Tokenize(commands::tokenize::TokenizeArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result: Result<()> = match cli.command {
        Commands::Simulate(args) => {
            init_tracing(args.verbose);
            commands::simulate::run(args)
        }
        Commands::Tokenize(args) => commands::tokenize::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::failed(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
