//! Run and instance lifecycle types
//!
//! An orchestrator run progresses through the following states:
//!
//! ```text
//! Starting → Running → ShuttingDown → Stopped
//!     └──────────────────────┘   (launch aborted)
//! ```
//!
//! Each instance launched by the run carries a [`Liveness`] that is only
//! known when the orchestrator probes the process.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Manifest file format version
pub const MANIFEST_VERSION: u32 = 1;

/// Lifecycle state of an orchestrator run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    /// Directories are being prepared and workers launched
    Starting,
    /// Every instance has been launched; waiting for an interrupt
    Running,
    /// Termination requests are being issued
    ShuttingDown,
    /// Termination has been requested for every registered instance
    Stopped,
}

impl RunState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Starting, RunState::Running)
                | (RunState::Starting, RunState::ShuttingDown)
                | (RunState::Running, RunState::ShuttingDown)
                | (RunState::ShuttingDown, RunState::Stopped)
        )
    }

    /// Check if the run reached its final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Stopped)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::ShuttingDown => "shutting-down",
            RunState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Observed liveness of a launched worker process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Liveness {
    /// Process is still running
    Running,
    /// Process has exited
    Exited,
    /// Liveness could not be determined (e.g. recovered from a PID record)
    Unknown,
}

impl Liveness {
    /// Check if the process is known to be gone
    pub fn is_exited(&self) -> bool {
        matches!(self, Liveness::Exited)
    }
}

/// Information about a worker process exit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    /// Process ID that exited
    pub pid: u32,

    /// Exit code (None if killed by signal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Signal that killed the process (Unix only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Check if this represents a successful exit (code 0)
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// Durable record of a single launched instance
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    /// Instance index in `[0, N)`
    pub index: usize,
    /// Process ID of the worker
    pub pid: u32,
    /// Instance home directory
    pub home: PathBuf,
    /// Combined stdout/stderr log file
    pub log_file: PathBuf,
}

/// Run manifest written to `<base>/flotilla.json`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    /// Format version
    pub version: u32,
    /// RFC3339 timestamp of the last update
    pub timestamp: String,
    /// Current run state
    pub state: RunState,
    /// Requested instance count
    pub requested: usize,
    /// Base home directory
    pub base_home: PathBuf,
    /// Worker program launched for every instance
    pub program: String,
    /// Launched instances in ascending index order
    pub instances: Vec<InstanceRecord>,
}

impl RunManifest {
    /// Create a manifest for a run that is about to start
    pub fn new(requested: usize, base_home: PathBuf, program: String) -> Self {
        Self {
            version: MANIFEST_VERSION,
            timestamp: crate::current_timestamp(),
            state: RunState::Starting,
            requested,
            base_home,
            program,
            instances: Vec::new(),
        }
    }
}
