//! File-watch trigger tests: debounced restarts and the ignore set.

mod common;

use common::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

use gopm2::config::AppSpec;
use gopm2::process::Status;

const TEST_TIMEOUT: Duration = Duration::from_secs(60);

fn watched_spec(name: &str, cwd: &std::path::Path) -> AppSpec {
    AppSpec {
        name: name.to_string(),
        script: "/bin/sleep".to_string(),
        args: vec!["60".to_string()],
        cwd: Some(cwd.to_path_buf()),
        watch: true,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn burst_of_writes_triggers_one_restart() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let data_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let manager = manager(&data_dir);

        manager
            .start_app(watched_spec("w", work_dir.path()))
            .await
            .unwrap();

        // Give the watcher a moment to finish walking the tree.
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Ten writes inside the debounce window.
        let target = work_dir.path().join("a.txt");
        for i in 0..10 {
            fs::write(&target, format!("change {i}")).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(
            wait_until(
                &manager,
                |items| items[0].restarts == 1 && items[0].status == Status::Online,
                Duration::from_secs(10),
            )
            .await,
            "watch restart never happened"
        );

        // Debounce: the burst produced exactly one restart.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.list().await[0].restarts, 1);

        manager.stop("w").await.unwrap();
    })
    .await
    .expect("test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn ignored_paths_do_not_restart() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let data_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        fs::create_dir(work_dir.path().join("node_modules")).unwrap();
        let manager = manager(&data_dir);

        manager
            .start_app(watched_spec("w", work_dir.path()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        fs::write(work_dir.path().join("node_modules/foo.js"), "x").unwrap();
        fs::write(work_dir.path().join("debug.log"), "x").unwrap();

        // Poll briefly to confirm nothing fires.
        assert!(
            !wait_until(
                &manager,
                |items| items[0].restarts > 0,
                Duration::from_secs(3),
            )
            .await,
            "ignored paths triggered a restart"
        );

        manager.stop("w").await.unwrap();
    })
    .await
    .expect("test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn watch_disable_stops_triggering() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let data_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let manager = manager(&data_dir);

        manager
            .start_app(watched_spec("w", work_dir.path()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        manager.watch_disable("w").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(work_dir.path().join("a.txt"), "change").unwrap();
        assert!(
            !wait_until(
                &manager,
                |items| items[0].restarts > 0,
                Duration::from_secs(3),
            )
            .await,
            "disabled watcher still triggered a restart"
        );

        // Enabling twice is an error.
        manager.watch_enable("w").await.unwrap();
        assert!(manager.watch_enable("w").await.is_err());

        manager.stop("w").await.unwrap();
    })
    .await
    .expect("test timed out");
}
