#[macro_use]
pub mod log;
pub mod lock;

use global_placeholders::global;
use macros_rs::crashln;
use nix::unistd::setsid;
use std::fs::{self, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};

use gopm2::error::Error;
use gopm2::globals::Paths;
use gopm2::helpers;
use gopm2::process::Manager;
use gopm2::socket;

/// Snapshot timer; also drives size-triggered log rotation.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(10);
/// Client-side bootstrap polling: 10 x 500ms.
const BOOTSTRAP_ATTEMPTS: u32 = 10;
const BOOTSTRAP_POLL: Duration = Duration::from_millis(500);

/// Run the daemon in the foreground. Clients spawn this detached via
/// the `daemon` subcommand and poll `daemon.lock` for liveness.
pub fn run() {
    if lock::exists() {
        match lock::read() {
            Ok(pid) if lock::running(pid) => {
                crashln!("{} The daemon is already running (pid={pid})", *helpers::FAIL)
            }
            _ => lock::remove(),
        }
    }

    // Detach from the spawning CLI's session; fails harmlessly when we
    // already lead a session.
    let _ = setsid();

    let paths = match Paths::new(Paths::default_base()) {
        Ok(paths) => paths,
        Err(err) => crashln!("{} Failed to prepare data directory: {err}", *helpers::FAIL),
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => crashln!("{} Failed to create runtime: {err}", *helpers::FAIL),
    };

    runtime.block_on(async move {
        lock::write(std::process::id());
        log!("[daemon] started", "pid" => std::process::id());

        let manager = Manager::new(paths.clone());
        manager.load().await;

        let socket_path = paths.socket();
        if socket_path.exists() {
            let _ = fs::remove_file(&socket_path);
        }

        let listener = match UnixListener::bind(&socket_path) {
            Ok(listener) => listener,
            Err(err) => {
                log!("[daemon] failed to bind socket", "error" => err);
                lock::remove();
                return;
            }
        };
        let _ = fs::set_permissions(&socket_path, fs::Permissions::from_mode(0o600));
        log!("[daemon] listening", "socket" => socket_path.display());

        let serve_task = tokio::spawn(socket::serve(listener, manager.clone()));

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => crashln!("{} Failed to install SIGTERM handler: {err}", *helpers::FAIL),
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(err) => crashln!("{} Failed to install SIGINT handler: {err}", *helpers::FAIL),
        };

        let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    manager.save().await;
                    manager.rotate_logs().await;
                }
                _ = sigterm.recv() => break,
                _ = sigint.recv() => break,
            }
        }

        log!("[daemon] shutting down");
        serve_task.abort();
        manager.shutdown().await;
        let _ = fs::remove_file(&socket_path);
        lock::remove();
        log!("[daemon] stopped", "pid" => std::process::id());
    });
}

/// Client side of bootstrap: reuse a live daemon, or spawn one detached
/// and wait for its lock file and socket to come up.
pub fn ensure_running() {
    let socket_path = PathBuf::from(global!("gopm2.socket"));
    if socket::is_daemon_running(&socket_path) {
        return;
    }

    let mut spawned = false;
    let alive = matches!(lock::read(), Ok(pid) if lock::running(pid));
    if !alive {
        lock::remove();
        println!("{} Starting GOPM2 daemon...", *helpers::SUCCESS);
        spawn_detached();
        spawned = true;
    }

    for _ in 0..BOOTSTRAP_ATTEMPTS {
        std::thread::sleep(BOOTSTRAP_POLL);
        if let Ok(pid) = lock::read() {
            if lock::running(pid) && socket::is_daemon_running(&socket_path) {
                if spawned {
                    println!("{} GOPM2 daemon started", *helpers::SUCCESS);
                }
                return;
            }
        }
    }

    crashln!(
        "{} {}",
        *helpers::FAIL,
        Error::DaemonUnavailable("daemon did not come up within 5s".to_string())
    );
}

fn spawn_detached() {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(err) => crashln!("{} Failed to locate gopm2 binary: {err}", *helpers::FAIL),
    };

    let open_log = || {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(global!("gopm2.daemon.log"))
    };
    let (stdout, stderr) = match (open_log(), open_log()) {
        (Ok(out), Ok(err)) => (Stdio::from(out), Stdio::from(err)),
        _ => (Stdio::null(), Stdio::null()),
    };

    if let Err(err) = Command::new(exe)
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
    {
        crashln!("{} Failed to spawn daemon: {err}", *helpers::FAIL);
    }
}
