//! Snapshot recovery: reattaching to still-alive children after a
//! daemon restart, and relaunching previously-live dead ones.
//!
//! The "old daemon" is simulated with a dedicated runtime that is torn
//! down without stopping anything, which kills the supervision tasks
//! but leaves the spawned children running.

mod common;

use common::*;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use gopm2::process::registry::Registry;
use gopm2::process::{dump, stats, ExecMode, Handles, Manager, Process, Status};

#[test]
fn daemon_restart_reattaches_live_child() {
    let dir = TempDir::new().unwrap();

    // First daemon lifetime: start a long-running child, snapshot, die.
    let pid = {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let pid = runtime.block_on(async {
            let manager = manager(&dir);
            manager.start_app(sleep_spec("long", "3600")).await.unwrap();
            manager.list().await[0].pid
        });
        runtime.shutdown_background();
        pid
    };

    assert!(pid > 0);
    assert!(stats::pid_alive(pid), "child must outlive the old daemon");

    // Second daemon lifetime: load the snapshot and reattach.
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let manager = manager(&dir);
        manager.load().await;

        let items = manager.list().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, Status::Online);
        assert_eq!(items[0].pid, pid, "reattached, not relaunched");

        manager.stop("long").await.unwrap();
        assert!(!stats::pid_alive(pid));
    });
}

#[test]
fn dead_but_previously_live_records_are_relaunched() {
    let dir = TempDir::new().unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let paths = paths(&dir);

        // Snapshot describing a record whose pid is long gone but which
        // was live before the daemon died.
        let mut registry = Registry::new();
        registry.insert(|id| Process {
            id,
            name: "long".to_string(),
            script: "/bin/sleep".to_string(),
            args: vec!["3600".to_string()],
            cwd: PathBuf::from("/"),
            env: BTreeMap::new(),
            exec_mode: ExecMode::Fork,
            instances: 1,
            status: Status::Online,
            pid: 4_000_000,
            start_time: Some(Utc::now()),
            restarts: 0,
            log_file: paths.default_log("long"),
            error_log_file: paths.default_error_log("long"),
            watch: false,
            watch_ignore: vec![],
            max_restarts: 15,
            min_uptime: Duration::from_secs(1),
            handles: Handles::default(),
        });
        dump::write(&paths, &registry).await;

        let manager = Manager::new(paths);
        manager.load().await;

        // Marked Stopped immediately, relaunched after the 2s delay.
        assert_eq!(manager.list().await[0].status, Status::Stopped);
        assert!(
            wait_until(
                &manager,
                |items| items[0].status == Status::Online && items[0].pid > 0,
                Duration::from_secs(6),
            )
            .await,
            "previously-live record was not relaunched"
        );

        manager.stop("long").await.unwrap();
    });
}

#[test]
fn never_started_records_stay_stopped() {
    let dir = TempDir::new().unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let paths = paths(&dir);

        let mut registry = Registry::new();
        registry.insert(|id| Process {
            id,
            name: "idle".to_string(),
            script: "/bin/sleep".to_string(),
            args: vec!["3600".to_string()],
            cwd: PathBuf::from("/"),
            env: BTreeMap::new(),
            exec_mode: ExecMode::Fork,
            instances: 1,
            status: Status::Stopped,
            pid: 0,
            start_time: None,
            restarts: 0,
            log_file: paths.default_log("idle"),
            error_log_file: paths.default_error_log("idle"),
            watch: false,
            watch_ignore: vec![],
            max_restarts: 15,
            min_uptime: Duration::from_secs(1),
            handles: Handles::default(),
        });
        dump::write(&paths, &registry).await;

        let manager = Manager::new(paths);
        manager.load().await;

        // No start_time on record: recovery must not invent a launch.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let items = manager.list().await;
        assert_eq!(items[0].status, Status::Stopped);
        assert_eq!(items[0].pid, 0);
    });
}
