//! Per-instance directory preparation
//!
//! Every instance `i` under base directory `B` owns:
//!
//! ```text
//! B/i/            home directory (worker working directory)
//! B/i/logs/       log directory
//! B/i/logs/node.log   combined stdout/stderr of the worker
//! B/i/node.pid    PID of the launched worker
//! ```
//!
//! Preparation is idempotent: running it against an already prepared
//! directory only truncates the log and clears the stale PID record.

use crate::{CoreError, Result};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the log directory inside an instance home
pub const LOG_DIR: &str = "logs";
/// Name of the combined output log file
pub const LOG_FILE: &str = "node.log";
/// Name of the PID record inside an instance home
pub const PID_FILE: &str = "node.pid";

/// Resolved filesystem layout of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDirs {
    /// Instance index
    pub index: usize,
    /// Home directory, `<base>/<index>`
    pub home: PathBuf,
    /// Log directory, `<home>/logs`
    pub logs: PathBuf,
    /// Log sink, `<home>/logs/node.log`
    pub log_file: PathBuf,
    /// PID record, `<home>/node.pid`
    pub pid_file: PathBuf,
}

impl InstanceDirs {
    /// Compute the layout for `index` under `base` without touching the filesystem
    pub fn resolve(base: &Path, index: usize) -> Self {
        let home = base.join(index.to_string());
        let logs = home.join(LOG_DIR);
        Self {
            index,
            log_file: logs.join(LOG_FILE),
            pid_file: home.join(PID_FILE),
            home,
            logs,
        }
    }

    /// Create the home and log directories and reset the log sink.
    ///
    /// The log file is created empty (or truncated) so the run starts with a
    /// clean log, and any PID record left by an earlier run is removed.
    pub fn prepare(base: &Path, index: usize) -> Result<Self> {
        let dirs = Self::resolve(base, index);

        fs::create_dir_all(&dirs.logs)
            .map_err(|e| CoreError::filesystem(index, &dirs.logs, e))?;

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&dirs.log_file)
            .map_err(|e| CoreError::filesystem(index, &dirs.log_file, e))?;

        match fs::remove_file(&dirs.pid_file) {
            Ok(()) => debug!("Removed stale PID record {}", dirs.pid_file.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::filesystem(index, &dirs.pid_file, e)),
        }

        debug!("Prepared instance {} at {}", index, dirs.home.display());
        Ok(dirs)
    }
}
