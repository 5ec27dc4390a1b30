//! Unix process management with safe spawn/terminate using process groups
//!
//! This module provides Unix-specific process management capabilities that use
//! process groups (via `setsid()`) to ensure safe and reliable process cleanup.
//!
//! ## Safety
//!
//! - All spawned processes are placed in their own process group using `setsid()`
//! - Signals are sent to the entire process group to ensure cleanup of child processes
//! - SIGTERM is used to request termination; delivery to a process that is
//!   already gone is reported as success
//!
//! ## Process Groups
//!
//! When a process calls `setsid()`, it:
//! - Creates a new session and becomes the session leader
//! - Creates a new process group and becomes the process group leader
//! - Has no controlling terminal
//!
//! A Ctrl-C typed into the orchestrator's terminal therefore reaches only the
//! orchestrator; workers are stopped by the orchestrator's drain.

// Allow unsafe code for this module since process management requires libc::setsid() calls
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use schema::{ExitInfo, Liveness};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// Everything needed to start one worker process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Program to execute (must be in PATH or an absolute path)
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Working directory of the child
    pub current_dir: Option<PathBuf>,
    /// Variables added on top of the inherited environment
    pub envs: Vec<(String, String)>,
    /// File receiving both stdout and stderr in append mode; `None` discards output
    pub output: Option<PathBuf>,
}

/// A child process managed with Unix process groups
///
/// This wrapper provides safe process group management for spawned processes.
/// The process is guaranteed to be in its own process group, allowing for
/// reliable cleanup of the entire process tree.
#[derive(Debug)]
pub struct ChildProcess {
    /// The process ID of the spawned process
    pid: Pid,
    /// The underlying Child handle for waiting and status checking
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Get the process group ID (same as PID for session leaders)
    pub fn pgid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the process to exit and return its exit status (async)
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Try to wait for the process to exit without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            CoreError::ProcessWait(format!(
                "Failed to try_wait for process {}: {}",
                self.pid, e
            ))
        })
    }

    /// Check liveness without blocking, reaping the child if it has exited
    pub fn liveness(&mut self) -> (Liveness, Option<ExitInfo>) {
        match self.try_wait() {
            Ok(None) => (Liveness::Running, None),
            Ok(Some(status)) => (Liveness::Exited, Some(exit_info(self.pid(), status))),
            Err(e) => {
                debug!("{}", e);
                (Liveness::Unknown, None)
            }
        }
    }
}

/// Convert an exit status into schema exit information
pub fn exit_info(pid: u32, status: ExitStatus) -> ExitInfo {
    ExitInfo {
        pid,
        exit_code: status.code(),
        signal: status.signal(),
    }
}

/// Spawn a new process in its own process group
///
/// The process is placed in its own process group via `setsid()`, which:
///
/// - Creates a new session with the process as session leader
/// - Creates a new process group with the process as group leader
/// - Detaches from the controlling terminal
///
/// When `request.output` is set, the file is opened in append mode and both
/// stdout and stderr are redirected to it. Standard input is always null.
///
/// ## Safety
///
/// This function uses `unsafe` code to call `libc::setsid()` in the `pre_exec`
/// closure. The safety is ensured because:
/// - `setsid()` is called in the child process before `exec()`
/// - `setsid()` is async-signal-safe and appropriate for use in `pre_exec`
/// - Error handling properly converts C errors to Rust errors
///
/// ## Example
///
/// ```rust,no_run
/// use flotilla_core::process::unix::{spawn, SpawnRequest};
///
/// # async fn demo() -> flotilla_core::Result<()> {
/// let child = spawn(&SpawnRequest {
///     program: "sleep".into(),
///     args: vec!["30".into()],
///     ..Default::default()
/// })?;
/// println!("Spawned process with PID: {}", child.pid());
/// # Ok(())
/// # }
/// ```
pub fn spawn(request: &SpawnRequest) -> Result<ChildProcess> {
    debug!("Spawning process: {} {:?}", request.program, request.args);

    let mut command = Command::new(&request.program);
    command.args(&request.args);
    command.envs(request.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if let Some(dir) = &request.current_dir {
        command.current_dir(dir);
    }

    command.stdin(Stdio::null());
    match &request.output {
        Some(path) => {
            let out = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    CoreError::ProcessSpawn(format!(
                        "Failed to open output {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            let err = out.try_clone().map_err(|e| {
                CoreError::ProcessSpawn(format!(
                    "Failed to duplicate output {}: {}",
                    path.display(),
                    e
                ))
            })?;
            command.stdout(Stdio::from(out));
            command.stderr(Stdio::from(err));
        }
        None => {
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());
        }
    }

    // Use pre_exec to call setsid() in the child process
    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    #[deny(unsafe_op_in_unsafe_fn)]
    unsafe {
        command.pre_exec(|| {
            // Create a new session and process group
            let result = libc::setsid();
            if result == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", request.program, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", request.program, e))
    })?;

    // tokio::process::Child::id() may return Option on some platforms
    let raw_pid = child
        .id()
        .ok_or_else(|| CoreError::ProcessSpawn("Spawned child did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Successfully spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

/// Send SIGTERM to the process group of a spawned child
///
/// See [`request_termination`] for the error semantics.
pub fn signal_term_group(child: &ChildProcess) -> Result<()> {
    request_termination(child.pid())
}

/// Convert a recorded PID into a `Pid`, rejecting values `pid_t` cannot hold
fn to_pid(pid: u32) -> Result<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(CoreError::ProcessSignal(format!(
            "PID {} is out of range",
            pid
        ))),
    }
}

/// Send SIGTERM to the process group `pgid` only
///
/// Used once the group leader has been reaped: its PID may be reused by an
/// unrelated process, but the group ID cannot be while helpers the leader
/// forked are still members. `ESRCH` (empty group) is success.
pub fn signal_group(pgid: u32) -> Result<()> {
    let target = to_pid(pgid)?;
    match killpg(target, Signal::SIGTERM) {
        Ok(()) => {
            debug!("Sent SIGTERM to remaining members of group {}", target);
            Ok(())
        }
        Err(Errno::ESRCH) => Ok(()),
        Err(e) => {
            error!("Failed to send SIGTERM to process group {}: {}", target, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send SIGTERM to process group {}: {}",
                target, e
            )))
        }
    }
}

/// Send SIGTERM to the process group led by `pid`
///
/// The group is signaled first so helper processes forked by the worker are
/// covered. If no such group exists the single process is signaled instead,
/// which handles PID records that point at a non-leader.
///
/// ## Error Handling
///
/// - `ESRCH` (No such process) is treated as success since it means the process
///   has already exited
/// - `EPERM` and other errors are propagated as `ProcessSignal` errors
pub fn request_termination(pid: u32) -> Result<()> {
    let target = to_pid(pid)?;
    debug!("Sending SIGTERM to process group {}", target);

    let outcome = match killpg(target, Signal::SIGTERM) {
        Err(Errno::ESRCH) => {
            debug!("No process group {}, signaling the process", target);
            kill(target, Signal::SIGTERM)
        }
        other => other,
    };

    match outcome {
        Ok(()) => {
            debug!("Successfully sent SIGTERM to {}", target);
            Ok(())
        }
        Err(Errno::ESRCH) => {
            // Process doesn't exist, which means it already exited
            debug!("Process {} already exited", target);
            Ok(())
        }
        Err(e) => {
            error!("Failed to send SIGTERM to process group {}: {}", target, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send SIGTERM to process group {}: {}",
                target, e
            )))
        }
    }
}

/// Check whether a PID refers to a live process using signal 0
///
/// Used for processes that are not children of this orchestrator, so the
/// exit status cannot be collected.
pub fn check_pid(pid: u32) -> Liveness {
    let Ok(target) = to_pid(pid) else {
        return Liveness::Unknown;
    };
    match kill(target, None::<Signal>) {
        Ok(()) => Liveness::Running,
        Err(Errno::ESRCH) => Liveness::Exited,
        // The process exists but belongs to someone else
        Err(Errno::EPERM) => Liveness::Running,
        Err(_) => Liveness::Unknown,
    }
}
