//! Core error types and utilities

use std::path::PathBuf;
use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Argument error: {0}")]
    Argument(String),

    #[error("Filesystem error for instance {index} at {}: {source}", path.display())]
    Filesystem {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Launch error for instance {index}: {reason}")]
    Launch { index: usize, reason: String },

    #[error("Termination error for instance {index} (PID {pid}): {reason}")]
    Termination {
        index: usize,
        pid: u32,
        reason: String,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Process spawn error: {0}")]
    ProcessSpawn(String),

    #[error("Process signal error: {0}")]
    ProcessSignal(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Lifecycle registry errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no process recorded for instance {0}")]
    NotFound(usize),

    #[error("instance {index} already recorded with PID {pid}")]
    AlreadyRecorded { index: usize, pid: u32 },
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Argument(_) => "CORE001",
            CoreError::Filesystem { .. } => "CORE002",
            CoreError::Launch { .. } => "CORE003",
            CoreError::Termination { .. } => "CORE004",
            CoreError::Registry(_) => "CORE005",
            CoreError::ConfigurationError(_) => "CORE006",
            CoreError::ValidationError(_) => "CORE007",
            CoreError::InitializationError(_) => "CORE008",
            CoreError::ProcessSpawn(_) => "CORE009",
            CoreError::ProcessSignal(_) => "CORE010",
            CoreError::ProcessWait(_) => "CORE011",
            CoreError::IoError(_) => "CORE012",
            CoreError::SerializationError(_) => "CORE013",
        }
    }

    /// Instance index this error is attributed to, if any
    pub fn instance(&self) -> Option<usize> {
        match self {
            CoreError::Filesystem { index, .. }
            | CoreError::Launch { index, .. }
            | CoreError::Termination { index, .. } => Some(*index),
            CoreError::Registry(RegistryError::NotFound(index))
            | CoreError::Registry(RegistryError::AlreadyRecorded { index, .. }) => Some(*index),
            _ => None,
        }
    }

    /// Build a filesystem error for an instance path
    pub fn filesystem(index: usize, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Filesystem {
            index,
            path: path.into(),
            source,
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
