//! Flotilla CLI binary
//!
//! Launches N worker instances, waits for Ctrl-C (or SIGTERM) and stops them.

#![allow(unused_crate_dependencies)]

use clap::Parser;
use cli::Cli;
use flotilla_core::shutdown::InterruptListener;
use flotilla_core::utils::init_tracing;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors exit with status 2 before anything is created
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("flotilla: failed to initialize logging: {e}");
    }

    // Handlers go in before the first worker is launched so an early Ctrl-C
    // is buffered instead of killing the orchestrator mid-launch.
    let listener = match InterruptListener::install() {
        Ok(listener) => listener,
        Err(e) => {
            error!("[{}] {}", e.code(), e);
            return ExitCode::FAILURE;
        }
    };

    match cli::run(&cli, listener.recv()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[{}] {}", e.code(), e);
            ExitCode::from(e.exit_code())
        }
    }
}
