use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::registry::SharedRecord;
use super::{launcher, stats, Manager, Status};

/// Backoff applied when a child died before reaching `min_uptime`.
const FAST_FAIL_BACKOFF: Duration = Duration::from_secs(1);
/// Delay between observing an unexpected exit and relaunching.
const RELAUNCH_DELAY: Duration = Duration::from_secs(1);
/// Poll interval for reattached children we hold no handle for.
const REATTACH_POLL: Duration = Duration::from_millis(500);

/// What the supervisor waits on: the child handle for processes we
/// spawned, or bare pid polling for children reattached after a daemon
/// restart.
pub enum Wait {
    Child(tokio::process::Child),
    Pid(i64),
}

impl Wait {
    async fn exited(&mut self) -> String {
        match self {
            Wait::Child(child) => match child.wait().await {
                Ok(status) => match status.code() {
                    Some(code) => format!("exit code {code}"),
                    None => "killed by signal".to_string(),
                },
                Err(err) => format!("wait failed: {err}"),
            },
            Wait::Pid(pid) => {
                while stats::pid_alive(*pid) {
                    tokio::time::sleep(REATTACH_POLL).await;
                }
                "pid gone".to_string()
            }
        }
    }
}

/// Snapshot without blocking the supervisor: a stop may be holding the
/// registry writer lock while it waits for us to observe the exit, so
/// the supervisor itself must never sit on the registry lock.
fn save_in_background(manager: &Arc<Manager>) {
    let manager = manager.clone();
    tokio::spawn(async move {
        manager.save().await;
    });
}

/// Spawn the supervision task for one record. The task owns the child
/// handle, never touches the registry lock, and holds the record lock
/// across a relaunch attempt so `list` cannot observe a transient
/// error state: exposed transitions are Online -> Online (new pid) or
/// Online -> Errored (parked).
pub fn spawn(
    manager: Arc<Manager>,
    record: SharedRecord,
    wait: Wait,
    exit_tx: watch::Sender<bool>,
) -> JoinHandle<()> {
    tokio::spawn(supervise(manager, record, wait, exit_tx))
}

async fn supervise(
    manager: Arc<Manager>,
    record: SharedRecord,
    mut wait: Wait,
    exit_tx: watch::Sender<bool>,
) {
    loop {
        let exit = wait.exited().await;

        let mut process = record.lock().await;

        // Intentional stop: the stop protocol owns the cleanup.
        if matches!(process.status, Status::Stopping | Status::Stopped) {
            let _ = exit_tx.send(true);
            return;
        }

        let name = process.name.clone();
        let uptime = process
            .start_time
            .map(|t| (Utc::now() - t).to_std().unwrap_or_default())
            .unwrap_or_default();
        process.pid = 0;

        launcher::append_event(
            &process.log_file,
            &format!("process exited unexpectedly ({exit})"),
        );

        if process.restarts >= process.max_restarts {
            process.status = Status::Errored;
            process.handles.stdout_log = None;
            process.handles.stderr_log = None;
            if let Some(stop_tx) = process.handles.watcher_tx.take() {
                let _ = stop_tx.try_send(());
            }
            launcher::append_event(
                &process.log_file,
                &format!("max restarts reached ({}), giving up", process.max_restarts),
            );
            log::warn!(
                "'{name}' reached max restarts ({}), parked as errored",
                process.max_restarts
            );
            drop(process);
            let _ = exit_tx.send(true);
            save_in_background(&manager);
            return;
        }

        if uptime < process.min_uptime {
            tokio::time::sleep(FAST_FAIL_BACKOFF).await;
        }

        process.restarts += 1;
        tokio::time::sleep(RELAUNCH_DELAY).await;

        match launcher::spawn_child(&mut process, manager.paths()) {
            Ok(spawned) => {
                process.pid = spawned.pid;
                process.status = Status::Online;
                process.start_time = Some(Utc::now());
                wait = Wait::Child(spawned.child);
                launcher::append_event(
                    &process.log_file,
                    &format!("restarted (attempt {}, pid {})", process.restarts, spawned.pid),
                );
                log::info!(
                    "restarted '{name}' (attempt {}, pid {})",
                    process.restarts,
                    spawned.pid
                );
                drop(process);
                save_in_background(&manager);
            }
            Err(err) => {
                process.status = Status::Errored;
                process.handles.stdout_log = None;
                process.handles.stderr_log = None;
                if let Some(stop_tx) = process.handles.watcher_tx.take() {
                    let _ = stop_tx.try_send(());
                }
                launcher::append_event(&process.log_file, &format!("relaunch failed: {err}"));
                log::error!("relaunch of '{name}' failed: {err}");
                drop(process);
                let _ = exit_tx.send(true);
                save_in_background(&manager);
                return;
            }
        }
    }
}
