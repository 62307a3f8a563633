use global_placeholders::global;
use std::fs;
use std::path::PathBuf;

use gopm2::process::stats;

/// `daemon.lock` holds the daemon's pid as an ASCII integer. A lock
/// whose pid is no longer alive is stale and safe to remove.

fn path() -> PathBuf {
    PathBuf::from(global!("gopm2.lock"))
}

pub fn exists() -> bool {
    path().exists()
}

pub fn read() -> Result<i64, String> {
    let raw = fs::read_to_string(path()).map_err(|err| err.to_string())?;
    raw.trim()
        .parse::<i64>()
        .map_err(|err| format!("invalid pid in daemon.lock: {err}"))
}

pub fn write(pid: u32) {
    if let Err(err) = fs::write(path(), pid.to_string()) {
        log::error!("failed to write daemon.lock: {err}");
    }
}

pub fn remove() {
    if let Err(err) = fs::remove_file(path()) {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::warn!("failed to remove daemon.lock: {err}");
        }
    }
}

pub fn running(pid: i64) -> bool {
    stats::pid_alive(pid)
}
