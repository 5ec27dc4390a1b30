//! Orchestrator run
//!
//! Ties the pieces together for one run:
//!
//! 1. each instance directory is prepared and its worker launched, strictly
//!    one after another;
//! 2. the run idles on a single interrupt future;
//! 3. the shutdown coordinator drains the registry.
//!
//! If preparing or launching any instance fails, the remaining instances are
//! not launched and the ones already running are drained before the error is
//! returned, so an aborted run never leaves untracked workers behind.

use crate::config::RunConfig;
use crate::instance::InstanceDirs;
use crate::launcher::{Launcher, ProcessAdapter};
use crate::persistence::{load_manifest, manifest_path, write_manifest};
use crate::registry::LifecycleRegistry;
use crate::shutdown::{DrainReport, ShutdownCoordinator};
use crate::{CoreError, Result};
use schema::{InstanceRecord, RunManifest, RunState};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Validated inputs of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Number of instances to launch (at least 1)
    pub count: usize,
    /// Base home directory; instance `i` lives in `<base>/<i>`
    pub base: PathBuf,
}

impl RunOptions {
    /// Validate the requested count and base directory
    pub fn new(count: usize, base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        if count == 0 {
            return Err(CoreError::Argument(
                "instance count must be at least 1".to_string(),
            ));
        }
        if base.as_os_str().is_empty() {
            return Err(CoreError::Argument(
                "base home directory cannot be empty".to_string(),
            ));
        }
        Ok(Self { count, base })
    }
}

/// One orchestrator run
#[derive(Debug)]
pub struct Orchestrator {
    options: RunOptions,
    launcher: Launcher,
    registry: LifecycleRegistry,
    coordinator: ShutdownCoordinator,
    state: RunState,
    manifest: RunManifest,
}

impl Orchestrator {
    /// Create a run; nothing touches the filesystem until [`Orchestrator::launch_all`]
    pub fn new(
        options: RunOptions,
        config: &RunConfig,
        adapter: Arc<dyn ProcessAdapter>,
    ) -> Result<Self> {
        config.validate()?;
        let launcher = Launcher::new(adapter, config.worker.clone(), config.worker_env());
        let manifest = RunManifest::new(
            options.count,
            options.base.clone(),
            config.worker.program.clone(),
        );
        Ok(Self {
            options,
            launcher,
            registry: LifecycleRegistry::new(),
            coordinator: ShutdownCoordinator::new(),
            state: RunState::Starting,
            manifest,
        })
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Registry of launched instances
    pub fn registry(&self) -> &LifecycleRegistry {
        &self.registry
    }

    /// Prepare and launch every instance in ascending index order.
    ///
    /// Stops at the first failure without draining; [`Orchestrator::run`]
    /// handles the drain.
    pub async fn launch_all(&mut self) -> Result<()> {
        info!(
            "Launching {} instance(s) of {} under {}",
            self.options.count,
            self.launcher.program(),
            self.options.base.display()
        );
        for index in 0..self.options.count {
            let dirs = InstanceDirs::prepare(&self.options.base, index)?;
            let pid = self.launcher.launch(&dirs, &mut self.registry).await?;
            self.manifest.instances.push(InstanceRecord {
                index,
                pid,
                home: dirs.home,
                log_file: dirs.log_file,
            });
        }
        self.transition(RunState::Running);
        Ok(())
    }

    /// Drain every launched instance and finish the run
    pub async fn shutdown(&mut self) -> DrainReport {
        self.transition(RunState::ShuttingDown);
        let report = self
            .coordinator
            .drain(&mut self.registry)
            .await
            .unwrap_or_default();
        self.transition(RunState::Stopped);
        report
    }

    /// Launch everything, wait for `interrupt`, then drain.
    ///
    /// `interrupt` is only polled after the launch phase, so it must already
    /// be listening (see [`crate::shutdown::InterruptListener`]) for signals
    /// that arrive mid-launch to be honored.
    pub async fn run<F>(mut self, interrupt: F) -> Result<DrainReport>
    where
        F: Future,
        F::Output: std::fmt::Debug,
    {
        if let Err(e) = self.launch_all().await {
            error!("Aborting run: {}", e);
            let report = self.shutdown().await;
            debug!("Drained {} instance(s) after abort", report.records.len());
            return Err(e);
        }

        info!(
            "All {} instance(s) running; press Ctrl-C to stop",
            self.registry.len()
        );
        let signal = interrupt.await;
        info!("Received {:?}, shutting down...", signal);
        Ok(self.shutdown().await)
    }

    fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            warn!("Ignoring run state change {} -> {}", self.state, next);
            return;
        }
        debug!("Run state {} -> {}", self.state, next);
        self.state = next;
        self.manifest.state = next;
        self.manifest.timestamp = schema::current_timestamp();

        let path = manifest_path(&self.options.base);
        if !self.options.base.is_dir() {
            return;
        }
        if let Err(e) = write_manifest(&path, &self.manifest) {
            warn!("Failed to write run manifest: {}", e);
        }
    }
}

/// Terminate the workers recorded by an earlier run's PID files
///
/// Missing or unreadable records are skipped (and listed in the report); the
/// remaining instances are still drained.
#[cfg(unix)]
pub async fn stop_recorded(options: &RunOptions) -> DrainReport {
    let (mut registry, skipped) = LifecycleRegistry::recover(&options.base, options.count);
    info!(
        "Recovered {} of {} PID record(s) under {}",
        registry.len(),
        options.count,
        options.base.display()
    );

    let mut report = ShutdownCoordinator::new()
        .drain(&mut registry)
        .await
        .unwrap_or_default();
    report.skipped = skipped;

    mark_manifest_stopped(&options.base);
    report
}

fn mark_manifest_stopped(base: &Path) {
    let path = manifest_path(base);
    match load_manifest(&path) {
        Ok(mut manifest) if !manifest.state.is_terminal() => {
            manifest.state = RunState::Stopped;
            manifest.timestamp = schema::current_timestamp();
            if let Err(e) = write_manifest(&path, &manifest) {
                warn!("Failed to update run manifest: {}", e);
            }
        }
        Ok(_) => {}
        Err(e) => debug!("No run manifest to update: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{MockCall, MockInstruction, MockProcessAdapter};
    use tempfile::tempdir;

    fn orchestrator(adapter: &MockProcessAdapter, count: usize, base: &Path) -> Orchestrator {
        Orchestrator::new(
            RunOptions::new(count, base).unwrap(),
            &RunConfig::default(),
            Arc::new(adapter.clone()),
        )
        .unwrap()
    }

    #[test]
    fn zero_count_is_argument_error() {
        let err = RunOptions::new(0, "/tmp/nodes").unwrap_err();
        assert!(matches!(err, CoreError::Argument(_)));
        assert!(RunOptions::new(1, "").is_err());
    }

    #[tokio::test]
    async fn run_launches_then_drains() {
        let tmp = tempdir().unwrap();
        let adapter = MockProcessAdapter::new();

        let report = orchestrator(&adapter, 3, tmp.path())
            .run(async {})
            .await
            .unwrap();

        assert_eq!(report.attempted(), vec![0, 1, 2]);
        let spawned: Vec<u32> = adapter
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Spawned { pid, .. } => Some(pid),
                _ => None,
            })
            .collect();
        assert_eq!(adapter.terminated(), spawned);

        let manifest = load_manifest(&manifest_path(tmp.path())).unwrap();
        assert_eq!(manifest.state, RunState::Stopped);
        assert_eq!(manifest.instances.len(), 3);
    }

    #[tokio::test]
    async fn launch_phase_completes_before_interrupt_is_seen() {
        let tmp = tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        // interrupt is already pending before the run starts
        tx.send(()).unwrap();

        let report = orchestrator(&adapter, 4, tmp.path())
            .run(rx)
            .await
            .unwrap();
        assert_eq!(report.attempted(), vec![0, 1, 2, 3]);

        let calls = adapter.calls();
        let last_spawn = calls
            .iter()
            .rposition(|c| matches!(c, MockCall::Spawned { .. }))
            .unwrap();
        let first_term = calls
            .iter()
            .position(|c| matches!(c, MockCall::Terminated { .. }))
            .unwrap();
        assert!(last_spawn < first_term);
    }

    #[tokio::test]
    async fn launch_failure_aborts_and_drains() {
        let tmp = tempdir().unwrap();
        let adapter = MockProcessAdapter::new().with_instructions(vec![
            MockInstruction::default(),
            MockInstruction {
                fail_spawn: true,
                ..Default::default()
            },
        ]);

        let err = orchestrator(&adapter, 3, tmp.path())
            .run(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Launch { index: 1, .. }));

        // instance 2 was never attempted, instance 0 was terminated
        assert_eq!(adapter.requests().len(), 2);
        assert!(!tmp.path().join("2").exists());
        assert_eq!(adapter.terminated().len(), 1);

        let manifest = load_manifest(&manifest_path(tmp.path())).unwrap();
        assert_eq!(manifest.state, RunState::Stopped);
    }

    #[tokio::test]
    async fn state_moves_through_lifecycle() {
        let tmp = tempdir().unwrap();
        let adapter = MockProcessAdapter::new();
        let mut orch = orchestrator(&adapter, 2, tmp.path());
        assert_eq!(orch.state(), RunState::Starting);

        orch.launch_all().await.unwrap();
        assert_eq!(orch.state(), RunState::Running);
        assert_eq!(orch.registry().len(), 2);
        assert_eq!(
            load_manifest(&manifest_path(tmp.path())).unwrap().state,
            RunState::Running
        );

        let report = orch.shutdown().await;
        assert_eq!(orch.state(), RunState::Stopped);
        assert_eq!(report.records.len(), 2);

        // a second shutdown neither re-drains nor changes state
        let again = orch.shutdown().await;
        assert!(again.records.is_empty());
        assert_eq!(adapter.terminated().len(), 2);
        assert_eq!(orch.state(), RunState::Stopped);
    }

    #[test]
    fn invalid_config_is_rejected_before_any_work() {
        let tmp = tempdir().unwrap();
        let base = tmp.path().join("nodes");
        let mut config = RunConfig::default();
        config.worker.program = String::new();

        let err = Orchestrator::new(
            RunOptions::new(2, &base).unwrap(),
            &config,
            Arc::new(MockProcessAdapter::new()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert!(!base.exists());
    }
}
