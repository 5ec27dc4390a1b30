//! CLI error types

use flotilla_core::CoreError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Bad command-line input not caught by clap
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unreadable or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The orchestrator run failed
    #[error("Run failed: {0}")]
    RunFailed(#[source] CoreError),
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Argument(msg) => CliError::InvalidArgument(msg),
            CoreError::ConfigurationError(msg) | CoreError::ValidationError(msg) => {
                CliError::ConfigError(msg)
            }
            other => CliError::RunFailed(other),
        }
    }
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArgument(_) => "CLI002",
            CliError::ConfigError(_) => "CLI003",
            CliError::RunFailed(e) => e.code(),
        }
    }

    /// Process exit status for this error
    ///
    /// Argument errors share clap's usage status; everything else is a
    /// failed run.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::InvalidArgument(_) => 2,
            _ => 1,
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;
