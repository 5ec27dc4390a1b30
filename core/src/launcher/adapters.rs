//! Process adapters for abstracting process management
//!
//! The orchestration logic only ever sees a [`ManagedProcess`]: an opaque
//! handle exposing the PID, a termination request and a liveness check.
//! Real workers come from [`UnixProcessAdapter`], workers recovered from PID
//! records are wrapped in [`PidProcess`], and tests use [`MockProcessAdapter`].

use crate::config::WorkerEnv;
use crate::{CoreError, Result};
use async_trait::async_trait;
use schema::{ExitInfo, Liveness};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Fully resolved launch parameters for one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Instance index
    pub index: usize,
    /// Program to execute
    pub program: String,
    /// Arguments with placeholders already substituted
    pub args: Vec<String>,
    /// Working directory (the instance home)
    pub home: PathBuf,
    /// Environment shared by every instance of the run
    pub env: WorkerEnv,
    /// Log sink receiving combined stdout/stderr
    pub log_file: PathBuf,
}

/// Trait for starting worker processes in a platform-agnostic way
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Start a worker according to the launch request; must not wait for it
    async fn spawn(&self, request: &LaunchRequest) -> Result<Box<dyn ManagedProcess>>;
}

/// Trait representing a launched process that can be signaled and checked
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Request termination (SIGTERM) of the process and its group.
    ///
    /// Already-exited processes are not an error; their group is still
    /// signaled so helpers they left behind are stopped.
    async fn terminate(&mut self) -> Result<()>;

    /// Check liveness without blocking; exit information is returned once known
    fn liveness(&mut self) -> (Liveness, Option<ExitInfo>);

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ExitInfo>;

    /// Whether the process may still be running
    fn is_alive(&mut self) -> bool {
        !self.liveness().0.is_exited()
    }
}

/// Unix process adapter using the process-group spawner
#[cfg(unix)]
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixProcessAdapter;

#[cfg(unix)]
impl UnixProcessAdapter {
    /// Create a new Unix process adapter
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessAdapter for UnixProcessAdapter {
    async fn spawn(&self, request: &LaunchRequest) -> Result<Box<dyn ManagedProcess>> {
        use crate::process::unix;

        debug!(
            "Spawning Unix process for instance {}: {} {:?}",
            request.index, request.program, request.args
        );

        let child = unix::spawn(&unix::SpawnRequest {
            program: request.program.clone(),
            args: request.args.clone(),
            current_dir: Some(request.home.clone()),
            envs: request
                .env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            output: Some(request.log_file.clone()),
        })?;

        Ok(Box::new(UnixManagedProcess { child, exit: None }))
    }
}

/// Unix managed process implementation
#[cfg(unix)]
struct UnixManagedProcess {
    child: crate::process::unix::ChildProcess,
    exit: Option<ExitInfo>,
}

#[cfg(unix)]
#[async_trait]
impl ManagedProcess for UnixManagedProcess {
    fn pid(&self) -> u32 {
        self.child.pid()
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.exit.is_some() {
            // Reaped: only the group may be addressed, never the bare PID
            return crate::process::unix::signal_group(self.child.pgid());
        }
        crate::process::unix::signal_term_group(&self.child)
    }

    fn liveness(&mut self) -> (Liveness, Option<ExitInfo>) {
        if let Some(exit) = self.exit {
            return (Liveness::Exited, Some(exit));
        }
        let (liveness, exit) = self.child.liveness();
        self.exit = exit;
        (liveness, exit)
    }

    async fn wait(&mut self) -> Result<ExitInfo> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let status = self.child.wait().await?;
        let exit = crate::process::unix::exit_info(self.pid(), status);
        self.exit = Some(exit);
        Ok(exit)
    }
}

/// Handle for a worker known only by its PID record
///
/// The process is not a child of this orchestrator, so its exit status is
/// never available; liveness comes from signal-0 checks.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidProcess {
    pid: u32,
}

#[cfg(unix)]
impl PidProcess {
    /// Wrap a recorded PID
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }
}

#[cfg(unix)]
#[async_trait]
impl ManagedProcess for PidProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn terminate(&mut self) -> Result<()> {
        crate::process::unix::request_termination(self.pid)
    }

    fn liveness(&mut self) -> (Liveness, Option<ExitInfo>) {
        (crate::process::unix::check_pid(self.pid), None)
    }

    async fn wait(&mut self) -> Result<ExitInfo> {
        while !crate::process::unix::check_pid(self.pid).is_exited() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(ExitInfo {
            pid: self.pid,
            exit_code: None,
            signal: None,
        })
    }
}

/// Instructions for mock process behavior
#[derive(Debug, Clone, Copy)]
pub struct MockInstruction {
    /// How long the process "runs" before exiting on its own
    pub exit_delay: Duration,
    /// Exit code reported when the process exits on its own
    pub exit_code: Option<i32>,
    /// Whether spawning should fail
    pub fail_spawn: bool,
    /// Whether termination requests should fail (e.g. EPERM)
    pub fail_terminate: bool,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            exit_delay: Duration::from_secs(3600),
            exit_code: Some(0),
            fail_spawn: false,
            fail_terminate: false,
        }
    }
}

/// Calls observed by a [`MockProcessAdapter`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// A process was spawned
    Spawned {
        /// Instance index of the launch
        index: usize,
        /// Fake PID handed out
        pid: u32,
    },
    /// Termination was requested for a process
    Terminated {
        /// PID that was signaled
        pid: u32,
    },
}

/// Mock process adapter for testing
#[derive(Debug, Clone)]
pub struct MockProcessAdapter {
    /// Instructions consumed one per spawn
    instructions: Arc<Mutex<Vec<MockInstruction>>>,
    /// Shared call journal
    journal: Arc<Mutex<Vec<MockCall>>>,
    /// Launch requests seen, in order
    requests: Arc<Mutex<Vec<LaunchRequest>>>,
    next_pid: Arc<AtomicU32>,
}

impl MockProcessAdapter {
    /// Create a new mock adapter with no pre-configured instructions
    pub fn new() -> Self {
        Self {
            instructions: Arc::new(Mutex::new(vec![])),
            journal: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
            next_pid: Arc::new(AtomicU32::new(10_000)),
        }
    }

    /// Set instructions for the next spawned processes, in order
    pub fn with_instructions(self, instructions: Vec<MockInstruction>) -> Self {
        *lock(&self.instructions) = instructions;
        self
    }

    /// Snapshot of the call journal
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.journal).clone()
    }

    /// PIDs that received a termination request, in order
    pub fn terminated(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Terminated { pid } => Some(pid),
                MockCall::Spawned { .. } => None,
            })
            .collect()
    }

    /// Launch requests received so far
    pub fn requests(&self) -> Vec<LaunchRequest> {
        lock(&self.requests).clone()
    }
}

impl Default for MockProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ProcessAdapter for MockProcessAdapter {
    async fn spawn(&self, request: &LaunchRequest) -> Result<Box<dyn ManagedProcess>> {
        debug!("Spawning mock process for instance {}", request.index);

        lock(&self.requests).push(request.clone());
        let instruction = {
            let mut instructions = lock(&self.instructions);
            if instructions.is_empty() {
                MockInstruction::default()
            } else {
                instructions.remove(0)
            }
        };

        if instruction.fail_spawn {
            return Err(CoreError::ProcessSpawn(format!(
                "Failed to spawn '{}': mock spawn failure",
                request.program
            )));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        lock(&self.journal).push(MockCall::Spawned {
            index: request.index,
            pid,
        });

        Ok(Box::new(MockManagedProcess {
            pid,
            instruction,
            started_at: std::time::Instant::now(),
            terminated: false,
            journal: self.journal.clone(),
        }))
    }
}

/// Mock managed process for testing
struct MockManagedProcess {
    pid: u32,
    instruction: MockInstruction,
    started_at: std::time::Instant,
    terminated: bool,
    journal: Arc<Mutex<Vec<MockCall>>>,
}

impl MockManagedProcess {
    fn should_exit(&self) -> bool {
        self.terminated || self.started_at.elapsed() >= self.instruction.exit_delay
    }

    fn create_exit(&self) -> ExitInfo {
        if self.terminated {
            ExitInfo {
                pid: self.pid,
                exit_code: None,
                signal: Some(15), // SIGTERM
            }
        } else {
            ExitInfo {
                pid: self.pid,
                exit_code: self.instruction.exit_code,
                signal: None,
            }
        }
    }
}

#[async_trait]
impl ManagedProcess for MockManagedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn terminate(&mut self) -> Result<()> {
        debug!("Terminating mock process {}", self.pid);
        lock(&self.journal).push(MockCall::Terminated { pid: self.pid });
        if self.instruction.fail_terminate {
            return Err(CoreError::ProcessSignal(format!(
                "Failed to send SIGTERM to process group {}: EPERM: Operation not permitted",
                self.pid
            )));
        }
        self.terminated = true;
        Ok(())
    }

    fn liveness(&mut self) -> (Liveness, Option<ExitInfo>) {
        if self.should_exit() {
            (Liveness::Exited, Some(self.create_exit()))
        } else {
            (Liveness::Running, None)
        }
    }

    async fn wait(&mut self) -> Result<ExitInfo> {
        // Simulate waiting for the process to exit
        while !self.should_exit() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(self.create_exit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_request(index: usize) -> LaunchRequest {
        LaunchRequest {
            index,
            program: "worker".to_string(),
            args: vec!["start".to_string()],
            home: PathBuf::from(format!("/nodes/{index}")),
            env: WorkerEnv::default(),
            log_file: PathBuf::from(format!("/nodes/{index}/logs/node.log")),
        }
    }

    #[tokio::test]
    async fn test_mock_adapter_spawn() {
        let adapter = MockProcessAdapter::new();

        let mut first = adapter.spawn(&create_test_request(0)).await.unwrap();
        let second = adapter.spawn(&create_test_request(1)).await.unwrap();
        assert!(first.pid() > 0);
        assert_ne!(first.pid(), second.pid());
        assert!(first.is_alive());
        assert_eq!(adapter.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_process_terminate() {
        let adapter = MockProcessAdapter::new();
        let mut process = adapter.spawn(&create_test_request(0)).await.unwrap();

        assert_eq!(process.liveness(), (Liveness::Running, None));
        process.terminate().await.unwrap();

        let exit = process.wait().await.unwrap();
        assert_eq!(exit.exit_code, None);
        assert_eq!(exit.signal, Some(15)); // SIGTERM
        assert_eq!(adapter.terminated(), vec![process.pid()]);
    }

    #[tokio::test]
    async fn test_mock_process_exits_on_its_own() {
        let adapter = MockProcessAdapter::new().with_instructions(vec![MockInstruction {
            exit_delay: Duration::ZERO,
            exit_code: Some(2),
            ..Default::default()
        }]);
        let mut process = adapter.spawn(&create_test_request(0)).await.unwrap();

        let (liveness, exit) = process.liveness();
        assert_eq!(liveness, Liveness::Exited);
        assert_eq!(exit.unwrap().exit_code, Some(2));
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_mock_spawn_failure() {
        let adapter = MockProcessAdapter::new().with_instructions(vec![MockInstruction {
            fail_spawn: true,
            ..Default::default()
        }]);
        let err = adapter.spawn(&create_test_request(0)).await.err().unwrap();
        assert!(matches!(err, CoreError::ProcessSpawn(_)));
        assert!(adapter.calls().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_adapter_launch_and_terminate() {
        let tmp = tempfile::tempdir().unwrap();
        let log_file = tmp.path().join("node.log");
        let request = LaunchRequest {
            index: 0,
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "echo up; exec sleep 30".to_string()],
            home: tmp.path().to_path_buf(),
            env: WorkerEnv::default(),
            log_file: log_file.clone(),
        };

        let mut process = UnixProcessAdapter::new().spawn(&request).await.unwrap();
        assert!(process.is_alive());

        process.terminate().await.unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .expect("worker did not exit")
            .unwrap();
        assert_eq!(exit.signal, Some(15));

        // Terminating again after the exit was observed only targets the empty group
        process.terminate().await.unwrap();
        assert_eq!(process.liveness().0, Liveness::Exited);
        assert!(std::fs::read_to_string(&log_file).unwrap().contains("up"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pid_process_for_missing_pid() {
        let mut child = crate::process::unix::spawn(&crate::process::unix::SpawnRequest {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), "exit 0".into()],
            ..Default::default()
        })
        .unwrap();
        child.wait().await.unwrap();

        let mut recovered = PidProcess::new(child.pid());
        assert_eq!(recovered.liveness().0, Liveness::Exited);
        assert!(recovered.terminate().await.is_ok());
    }
}
