//! CLI application for detecting and correcting page image orientation.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use upright_core::{EngineError, UprightError};

use commands::{config, run};

/// Upright - Detect and correct the orientation of scanned pages
#[derive(Parser)]
#[command(name = "upright")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and correct the orientation of page images
    Run(run::RunArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

/// Exit code when the orientation engine cannot be started.
const EXIT_ENGINE_UNAVAILABLE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {}", e);
    }

    // Execute command
    let result = match cli.command {
        Commands::Run(args) => run::run(args, cli.config.as_deref()).await,
        Commands::Config(args) => config::run(args, cli.config.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("✗").red(), e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<UprightError>() {
        Some(UprightError::Engine(EngineError::Unavailable(_))) => ExitCode::from(EXIT_ENGINE_UNAVAILABLE),
        _ => ExitCode::FAILURE,
    }
}
