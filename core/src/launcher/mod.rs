//! Worker launcher
//!
//! Starts one worker per prepared instance: the worker runs in the instance
//! home, writes its combined output to the instance log, and its identity is
//! recorded in the [`LifecycleRegistry`] and the `node.pid` file before
//! [`Launcher::launch`] returns. Launching is fire-and-forget; the worker's
//! exit status is only looked at when liveness is checked during a drain.

use crate::config::{WorkerCommand, WorkerEnv};
use crate::instance::InstanceDirs;
use crate::persistence::write_pid_file;
use crate::registry::LifecycleRegistry;
use crate::{CoreError, Result};
use std::sync::Arc;
use tracing::{error, info};

pub mod adapters;

pub use adapters::*;

/// Launches workers with a fixed command and environment
pub struct Launcher {
    adapter: Arc<dyn ProcessAdapter>,
    command: WorkerCommand,
    env: WorkerEnv,
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("command", &self.command)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl Launcher {
    /// Create a launcher for a run
    pub fn new(adapter: Arc<dyn ProcessAdapter>, command: WorkerCommand, env: WorkerEnv) -> Self {
        Self {
            adapter,
            command,
            env,
        }
    }

    /// Worker program launched for every instance
    pub fn program(&self) -> &str {
        &self.command.program
    }

    /// Build the launch request for a prepared instance
    pub fn request_for(&self, dirs: &InstanceDirs) -> LaunchRequest {
        LaunchRequest {
            index: dirs.index,
            program: self.command.program.clone(),
            args: self.command.render_args(dirs.index, &dirs.home),
            home: dirs.home.clone(),
            env: self.env.clone(),
            log_file: dirs.log_file.clone(),
        }
    }

    /// Start the worker for `dirs` and record it.
    ///
    /// The handle is stored in `registry` first, then the PID file is written.
    /// A failed PID write is reported as a filesystem error, but the process
    /// stays registered so a subsequent drain still terminates it.
    pub async fn launch(&self, dirs: &InstanceDirs, registry: &mut LifecycleRegistry) -> Result<u32> {
        let index = dirs.index;
        if let Ok(existing) = registry.lookup(index) {
            return Err(crate::RegistryError::AlreadyRecorded {
                index,
                pid: existing.pid(),
            }
            .into());
        }

        let request = self.request_for(dirs);
        let process = self.adapter.spawn(&request).await.map_err(|e| {
            error!("[instance {}] failed to launch {}: {}", index, request.program, e);
            CoreError::Launch {
                index,
                reason: e.to_string(),
            }
        })?;
        let pid = process.pid();
        registry.record(index, process)?;

        write_pid_file(&dirs.pid_file, pid)
            .map_err(|e| CoreError::filesystem(index, &dirs.pid_file, e))?;

        info!(
            "[instance {}] launched {} (PID {}), logging to {}",
            index,
            request.program,
            pid,
            dirs.log_file.display()
        );
        Ok(pid)
    }
}
