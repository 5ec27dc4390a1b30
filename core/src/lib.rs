//! Core functionality for the Flotilla orchestrator
//!
//! This crate contains the instance layout, worker launching, the lifecycle
//! registry and shutdown coordination used by the `flotilla` CLI.

pub mod config;
pub mod error;
pub mod instance;
pub mod launcher;
pub mod orchestrator;
pub mod persistence;
#[cfg(unix)]
pub mod process;
pub mod registry;
pub mod shutdown;


// Re-export schema types for convenience
pub use schema::*;

pub use config::{RunConfig, WorkerCommand, WorkerEnv};
pub use error::{CoreError, RegistryError, Result};
pub use instance::InstanceDirs;
#[cfg(unix)]
pub use orchestrator::stop_recorded;
pub use orchestrator::{Orchestrator, RunOptions};
pub use registry::LifecycleRegistry;
pub use shutdown::{DrainReport, ShutdownCoordinator, TerminationOutcome};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
