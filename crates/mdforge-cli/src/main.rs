mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod pool;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::pool::ChildLogging;
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    // A worker's stdout carries the batch protocol and nothing else.
    let is_worker = matches!(cli.command, Commands::Worker(_));
    let child_logging = ChildLogging {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    info!(
        "🚀 mdforge CLI v{} starting up.",
        env!("CARGO_PKG_VERSION")
    );
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let command_result = match cli.command {
        Commands::Build(args) => {
            info!("Dispatching to 'build' command.");
            commands::build::run(args, child_logging)
        }
        Commands::Plan(args) => {
            info!("Dispatching to 'plan' command.");
            commands::plan::run(args)
        }
        Commands::Inspect(args) => {
            info!("Dispatching to 'inspect' command.");
            commands::inspect::run(args)
        }
        Commands::Worker(args) => {
            info!("Dispatching to 'worker' command.");
            commands::worker::run(args)
        }
    };

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
            if !is_worker {
                println!("✅ Command completed successfully.");
            }
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
            if !is_worker {
                eprintln!("❌ Command failed: {}", e);
            }
        }
    }

    command_result
}
