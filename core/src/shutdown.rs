//! Shutdown coordination
//!
//! The coordinator is a small state machine:
//!
//! ```text
//! Idle → Draining → Done
//! ```
//!
//! The first interrupt moves it to `Draining`; any later attempt to start a
//! drain is ignored. While draining, every registry entry is visited in
//! ascending index order and asked to terminate. Individual failures are
//! collected in the [`DrainReport`] and never stop the walk. The coordinator
//! does not wait for workers to exit.

use crate::registry::{LifecycleRegistry, SkippedInstance};
use crate::{CoreError, Result};
use schema::{ExitInfo, Liveness};
use tracing::{error, info, warn};

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Waiting for an interrupt
    Idle,
    /// Termination requests are being issued
    Draining,
    /// Termination was requested for every registered instance
    Done,
}

/// Result of one termination attempt
#[derive(Debug)]
pub enum TerminationOutcome {
    /// SIGTERM was delivered (or the process vanished while signaling)
    Terminated,
    /// The process had already exited; its group was still signaled
    AlreadyExited(ExitInfo),
    /// The signal could not be delivered
    Failed(CoreError),
}

/// One drained instance
#[derive(Debug)]
pub struct TerminationRecord {
    /// Instance index
    pub index: usize,
    /// Recorded PID
    pub pid: u32,
    /// What happened
    pub outcome: TerminationOutcome,
}

/// Everything a drain did, in the order it was done
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Attempted instances in ascending index order
    pub records: Vec<TerminationRecord>,
    /// Instances that could not be attempted (missing PID records)
    pub skipped: Vec<SkippedInstance>,
}

impl DrainReport {
    /// Indices that received a termination request, in order
    pub fn attempted(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.index).collect()
    }

    /// Termination errors, one per failed instance
    pub fn failures(&self) -> impl Iterator<Item = &CoreError> {
        self.records.iter().filter_map(|r| match &r.outcome {
            TerminationOutcome::Failed(e) => Some(e),
            _ => None,
        })
    }

    /// Whether every attempt succeeded and nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none() && self.skipped.is_empty()
    }
}

/// Drains the lifecycle registry exactly once
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: CoordinatorState,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    /// Create an idle coordinator
    pub fn new() -> Self {
        Self {
            state: CoordinatorState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Request termination of every registered process.
    ///
    /// Returns `None` if a drain has already started; the registry is not
    /// touched in that case.
    pub async fn drain(&mut self, registry: &mut LifecycleRegistry) -> Option<DrainReport> {
        if self.state != CoordinatorState::Idle {
            warn!("Shutdown already in progress; ignoring repeated request");
            return None;
        }
        self.state = CoordinatorState::Draining;
        info!("Draining {} instance(s)", registry.len());

        let mut report = DrainReport::default();
        for (index, process) in registry.entries_mut() {
            let pid = process.pid();
            let exited = match process.liveness() {
                (Liveness::Exited, Some(exit)) => {
                    warn!(
                        "[instance {}] PID {} already exited ({}); stopping its process group",
                        index, pid, exit
                    );
                    Some(exit)
                }
                _ => {
                    info!("[instance {}] stopping worker (PID {})", index, pid);
                    None
                }
            };
            let outcome = match (process.terminate().await, exited) {
                (Ok(()), Some(exit)) => TerminationOutcome::AlreadyExited(exit),
                (Ok(()), None) => TerminationOutcome::Terminated,
                (Err(e), _) => {
                    let err = termination_error(index, pid, e);
                    error!("{}", err);
                    TerminationOutcome::Failed(err)
                }
            };
            report.records.push(TerminationRecord {
                index,
                pid,
                outcome,
            });
        }

        self.state = CoordinatorState::Done;
        info!(
            "Drain complete: {} requested, {} failed",
            report.records.len(),
            report.failures().count()
        );
        Some(report)
    }
}

fn termination_error(index: usize, pid: u32, source: CoreError) -> CoreError {
    match source {
        e @ CoreError::Termination { .. } => e,
        other => CoreError::Termination {
            index,
            pid,
            reason: other.to_string(),
        },
    }
}

/// Which external signal ended the idle wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// SIGINT (Ctrl-C)
    Interrupt,
    /// SIGTERM
    Terminate,
}

/// Listener for the signals that end a run
///
/// Handlers are installed by [`InterruptListener::install`]; signals that
/// arrive before [`InterruptListener::recv`] is awaited are buffered, so an
/// interrupt during the launch phase is processed once launching completes.
/// After the first signal the handlers stay installed, which keeps later
/// interrupts from killing the orchestrator mid-drain.
#[cfg(unix)]
#[derive(Debug)]
pub struct InterruptListener {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl InterruptListener {
    /// Install SIGINT and SIGTERM handlers
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let sigint = signal(SignalKind::interrupt()).map_err(|e| {
            CoreError::InitializationError(format!("Failed to install SIGINT handler: {e}"))
        })?;
        let sigterm = signal(SignalKind::terminate()).map_err(|e| {
            CoreError::InitializationError(format!("Failed to install SIGTERM handler: {e}"))
        })?;
        Ok(Self { sigint, sigterm })
    }

    /// Wait for the first interrupt
    pub async fn recv(mut self) -> Interrupt {
        tokio::select! {
            _ = self.sigint.recv() => Interrupt::Interrupt,
            _ = self.sigterm.recv() => Interrupt::Terminate,
        }
    }
}
