//! End-to-end orchestrator scenarios with real worker processes

#![cfg(unix)]
#![allow(unused_crate_dependencies)]

mod common;

use common::{idle_worker, is_dead, run_with_default_timeout, wait_dead, wait_for_file};
use flotilla_core::launcher::UnixProcessAdapter;
use flotilla_core::persistence::{load_manifest, manifest_path, read_pid_file};
use flotilla_core::process::unix::{spawn, SpawnRequest};
use flotilla_core::{
    stop_recorded, CoreError, Orchestrator, RunConfig, RunOptions, RunState, TerminationOutcome,
};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn orchestrator(base: &Path, count: usize, config: RunConfig) -> Orchestrator {
    Orchestrator::new(
        RunOptions::new(count, base).unwrap(),
        &config,
        Arc::new(UnixProcessAdapter::new()),
    )
    .unwrap()
}

fn idle_config() -> RunConfig {
    let (program, args) = idle_worker();
    RunConfig::default().with_command(program, args)
}

fn recorded_pid(base: &Path, index: usize) -> u32 {
    read_pid_file(&base.join(index.to_string()).join("node.pid")).unwrap()
}

#[tokio::test]
async fn three_instances_run_until_interrupted() {
    let tmp = tempdir().unwrap();
    let base = tmp.path().join("nodes");
    let last_pid = base.join("2").join("node.pid");
    let last_log = base.join("2").join("logs").join("node.log");

    let interrupt = async {
        wait_for_file(&last_pid).await;
        // let the last worker print its banner before stopping everyone
        for _ in 0..100 {
            if !std::fs::read_to_string(&last_log)
                .unwrap_or_default()
                .is_empty()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    };

    let report = run_with_default_timeout(orchestrator(&base, 3, idle_config()).run(interrupt))
        .await
        .unwrap();

    assert_eq!(report.attempted(), vec![0, 1, 2]);
    assert!(report.is_clean());

    let mut pids = Vec::new();
    for index in 0..3 {
        let home = base.join(index.to_string());
        assert!(home.join("logs").is_dir());
        let pid = recorded_pid(&base, index);
        assert_eq!(report.records[index].pid, pid);
        assert!(matches!(
            report.records[index].outcome,
            TerminationOutcome::Terminated
        ));
        pids.push(pid);
    }
    for pid in &pids {
        wait_dead(*pid).await;
    }

    let banner = std::fs::read_to_string(&last_log).unwrap();
    assert!(banner.contains("instance 2 in"), "{banner}");
    assert!(banner.contains("tx=1KiB"), "{banner}");

    let manifest = load_manifest(&manifest_path(&base)).unwrap();
    assert_eq!(manifest.state, RunState::Stopped);
    assert_eq!(manifest.requested, 3);
    assert_eq!(
        manifest.instances.iter().map(|i| i.pid).collect::<Vec<_>>(),
        pids
    );
}

#[tokio::test]
async fn filesystem_failure_stops_launching_and_drains() {
    let tmp = tempdir().unwrap();
    let base = tmp.path().to_path_buf();
    std::fs::write(base.join("1"), "not a directory").unwrap();

    let err = run_with_default_timeout(
        orchestrator(&base, 3, idle_config()).run(std::future::pending::<()>()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CoreError::Filesystem { index: 1, .. }), "{err}");
    assert!(!base.join("2").exists());
    wait_dead(recorded_pid(&base, 0)).await;
}

#[tokio::test]
async fn launch_failure_stops_launching() {
    let tmp = tempdir().unwrap();
    let base = tmp.path().to_path_buf();
    let config = RunConfig::default().with_command(
        "flotilla-test-no-such-worker".to_string(),
        vec!["--home".to_string(), "{home}".to_string()],
    );

    let err = run_with_default_timeout(
        orchestrator(&base, 2, config).run(std::future::pending::<()>()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CoreError::Launch { index: 0, .. }), "{err}");
    assert!(base.join("0").join("logs").is_dir());
    assert!(!base.join("0").join("node.pid").exists());
    assert!(!base.join("1").exists());
}

#[tokio::test]
async fn stop_recorded_terminates_workers_from_pid_files() {
    let tmp = tempdir().unwrap();
    let base = tmp.path().to_path_buf();

    let mut children = Vec::new();
    for index in [0usize, 2] {
        let home = base.join(index.to_string());
        std::fs::create_dir_all(&home).unwrap();
        let child = spawn(&SpawnRequest {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), "exec sleep 60".into()],
            ..Default::default()
        })
        .unwrap();
        flotilla_core::persistence::write_pid_file(&home.join("node.pid"), child.pid()).unwrap();
        children.push(child);
    }

    let report = run_with_default_timeout(stop_recorded(&RunOptions::new(3, &base).unwrap())).await;
    assert_eq!(report.attempted(), vec![0, 2]);
    assert_eq!(
        report.skipped.iter().map(|s| s.index).collect::<Vec<_>>(),
        vec![1]
    );
    assert!(report.failures().next().is_none());

    for child in &mut children {
        let status = run_with_default_timeout(child.wait()).await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }
}

#[tokio::test]
async fn workers_that_exit_early_still_have_their_helpers_stopped() {
    let tmp = tempdir().unwrap();
    let base = tmp.path().to_path_buf();
    let config = RunConfig::default().with_command(
        "/bin/sh".to_string(),
        vec![
            "-c".to_string(),
            "sleep 30 & echo $! > helper.pid; exit {index}".to_string(),
        ],
    );
    let helper_file = |index: usize| base.join(index.to_string()).join("helper.pid");

    let interrupt = async {
        for index in 0..2 {
            wait_for_file(&base.join(index.to_string()).join("node.pid")).await;
            wait_for_file(&helper_file(index)).await;
            // leaders are zombies until the drain reaps them
            wait_dead(recorded_pid(&base, index)).await;
        }
    };

    let report = run_with_default_timeout(orchestrator(&base, 2, config).run(interrupt))
        .await
        .unwrap();

    assert_eq!(report.attempted(), vec![0, 1]);
    assert!(report.is_clean());
    for (index, record) in report.records.iter().enumerate() {
        match &record.outcome {
            TerminationOutcome::AlreadyExited(exit) => {
                assert_eq!(exit.exit_code, Some(index as i32));
            }
            other => panic!("instance {index}: expected AlreadyExited, got {other:?}"),
        }
    }

    for index in 0..2 {
        let helper: u32 = std::fs::read_to_string(helper_file(index))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        wait_dead(helper).await;
        assert!(is_dead(helper));
    }
}
