//! Test utilities for CLI crate integration tests.
#![allow(missing_docs, dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run the given future with a timeout, failing the test if it elapses.
///
/// # Panics
///
/// Panics if the timeout elapses before the future completes.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Path of the built `flotilla` binary
pub fn flotilla_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_flotilla"))
}

/// PID recorded for instance `index` under `base`
pub fn recorded_pid(base: &Path, index: usize) -> u32 {
    let text = std::fs::read_to_string(base.join(index.to_string()).join("node.pid")).unwrap();
    text.trim().parse().unwrap()
}

/// Whether `pid` is gone or a zombie waiting to be reaped.
pub fn is_dead(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .map_or(false, |state| state == 'Z' || state == 'X'),
        Err(_) => true,
    }
}

/// Poll until `pid` is dead, failing after five seconds.
pub async fn wait_dead(pid: u32) {
    for _ in 0..100 {
        if is_dead(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("process {pid} is still alive");
}

/// Poll until `path` exists, failing after ten seconds.
pub async fn wait_for_file(path: &Path) {
    for _ in 0..200 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} never appeared", path.display());
}
