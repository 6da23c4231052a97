//! # cmmn CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmmn_cli::simulate::{run_simulate, SimulateArgs};
use cmmn_cli::transitions::{run_transitions, TransitionsArgs};
use cmmn_cli::validate::{run_validate, ValidateArgs};

/// Case engine CLI.
///
/// Validates case blueprints, prints the plan-item and case-file lifecycle
/// tables, and simulates scripted case runs.
#[derive(Parser, Debug)]
#[command(name = "cmmn", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the engine configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load blueprints and check every reference in them.
    Validate(ValidateArgs),

    /// Print the lifecycle transition tables.
    Transitions(TransitionsArgs),

    /// Create a case from a blueprint and apply a script of steps.
    Simulate(SimulateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let result = cmmn_cli::load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Validate(args) => run_validate(&args),
        Commands::Transitions(args) => run_transitions(&args),
        Commands::Simulate(args) => run_simulate(&args, config),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
