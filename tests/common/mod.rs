#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use gopm2::config::AppSpec;
use gopm2::globals::Paths;
use gopm2::process::{Manager, ProcessItem};

pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn paths(dir: &TempDir) -> Paths {
    Paths::new(dir.path().to_path_buf()).unwrap()
}

pub fn manager(dir: &TempDir) -> Arc<Manager> {
    Manager::new(paths(dir))
}

/// A spec running `/bin/sleep <secs>` under the given name.
pub fn sleep_spec(name: &str, secs: &str) -> AppSpec {
    AppSpec {
        name: name.to_string(),
        script: "/bin/sleep".to_string(),
        args: vec![secs.to_string()],
        ..Default::default()
    }
}

/// A spec running `sh -c <command>`.
pub fn shell_spec(name: &str, command: &str) -> AppSpec {
    AppSpec {
        name: name.to_string(),
        script: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), command.to_string()],
        ..Default::default()
    }
}

/// Poll `list` until the predicate holds or the timeout expires.
/// Event-driven assertions beat fixed sleeps for flakiness.
pub async fn wait_until<F>(manager: &Arc<Manager>, mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut(&[ProcessItem]) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let items = manager.list().await;
        if predicate(&items) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

pub fn find<'a>(items: &'a [ProcessItem], name: &str) -> Option<&'a ProcessItem> {
    items.iter().find(|item| item.name == name)
}
