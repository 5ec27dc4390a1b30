//! Flotilla command-line front end
//!
//! Parses the command line, builds the run configuration and drives one
//! [`Orchestrator`] run (or a `--stop` drain of a previous run).

use clap::Parser;
use flotilla_core::config::load_config_from_toml_path;
use flotilla_core::launcher::UnixProcessAdapter;
use flotilla_core::{
    stop_recorded, DrainReport, Orchestrator, RunConfig, RunOptions, TerminationOutcome,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub mod error;

pub use error::{CliError, Result};

/// Launch N local worker instances and stop them all on Ctrl-C
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "flotilla")]
#[command(version)]
#[command(about = "Launch N local worker instances and stop them all on Ctrl-C")]
pub struct Cli {
    /// Number of instances to run
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub nodes: u32,

    /// Base home directory; instance i lives in <DIR>/<i>
    #[arg(long, value_name = "DIR")]
    pub home: PathBuf,

    /// TOML file with the worker command and parameters
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Stop the workers recorded under --home by an earlier run, then exit
    #[arg(long)]
    pub stop: bool,

    /// Worker command overriding the configured one ({home} and {index} are substituted)
    #[arg(last = true, value_name = "PROGRAM")]
    pub command: Vec<String>,
}

impl Cli {
    /// Validated run options
    pub fn options(&self) -> Result<RunOptions> {
        Ok(RunOptions::new(self.nodes as usize, &self.home)?)
    }

    /// Build the run configuration from `--config` and the trailing command
    pub fn run_config(&self) -> Result<RunConfig> {
        let config = match &self.config {
            Some(path) => load_config_from_toml_path(path)?,
            None => RunConfig::default(),
        };
        let config = match self.command.split_first() {
            Some((program, args)) => config.with_command(program.clone(), args.to_vec()),
            None => config,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Execute the parsed command line.
///
/// `interrupt` ends the idle wait of a normal run; it is ignored with `--stop`.
pub async fn run<F>(cli: &Cli, interrupt: F) -> Result<DrainReport>
where
    F: Future,
    F::Output: std::fmt::Debug,
{
    let options = cli.options()?;
    if cli.stop {
        let report = stop_recorded(&options).await;
        summarize(&report);
        return Ok(report);
    }

    let config = cli.run_config()?;
    let orchestrator = Orchestrator::new(options, &config, Arc::new(UnixProcessAdapter::new()))?;
    let report = orchestrator.run(interrupt).await?;
    summarize(&report);
    Ok(report)
}

/// Log the outcome of a drain
pub fn summarize(report: &DrainReport) {
    let mut stopped = 0;
    let mut exited = 0;
    for record in &report.records {
        match &record.outcome {
            TerminationOutcome::Terminated => stopped += 1,
            TerminationOutcome::AlreadyExited(_) => exited += 1,
            TerminationOutcome::Failed(_) => {}
        }
    }
    let failed = report.failures().count();
    info!(
        "Stopped {} worker(s), {} had already exited, {} failed, {} skipped",
        stopped,
        exited,
        failed,
        report.skipped.len()
    );
    if failed > 0 {
        warn!("Some workers may still be running; check their node.pid files");
    }
}
